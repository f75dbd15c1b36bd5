// src/lua_api.rs

//! Glue between the engine's Rust types and the Lua world scripts live in.
//!
//! Scripts see a global `scan` table (`scan.args`, `scan.verbosity()`,
//! `scan.debugging()`, `scan.debug(msg)`) plus per-invocation `host` /
//! `port` tables built fresh from the Rust snapshots. Each task runs the
//! script body inside its own environment table whose `__index` falls back
//! to the shared globals, which is how scripts get private mutable globals
//! without interfering across concurrent invocations.

use std::rc::Rc;

use mlua::{Lua, Table, Value};
use tracing::debug;

use crate::api::ScanApi;
use crate::args::parse_script_args;
use crate::errors::Result;
use crate::host::{HostSnapshot, PortSnapshot};

/// Install the `scan` global table.
///
/// Called once per engine; the table is shared by every script through the
/// environment fallback chain.
pub(crate) fn register_scan_table(lua: &Lua, api: &Rc<dyn ScanApi>) -> Result<()> {
    let scan = lua.create_table()?;

    let args = match api.scriptargs() {
        Some(raw) if !raw.is_empty() => parse_script_args(lua, &raw)?,
        _ => lua.create_table()?,
    };
    scan.set("args", args)?;

    let a = Rc::clone(api);
    scan.set(
        "verbosity",
        lua.create_function(move |_, ()| Ok(a.verbosity()))?,
    )?;

    let a = Rc::clone(api);
    scan.set(
        "debugging",
        lua.create_function(move |_, ()| Ok(a.debugging()))?,
    )?;

    scan.set(
        "debug",
        lua.create_function(|_, msg: String| {
            debug!(target: "scanscript::script", "{msg}");
            Ok(())
        })?,
    )?;

    lua.globals().set("scan", scan)?;
    Ok(())
}

/// Fresh environment for one evaluation of a script body.
///
/// Seeded with `runlevel = 1` and the script's `filename`; everything else
/// resolves through `__index` to the shared globals.
pub(crate) fn fresh_script_env(lua: &Lua, filename: &str) -> mlua::Result<Table> {
    let env = lua.create_table()?;
    env.set("runlevel", 1)?;
    env.set("filename", filename)?;

    let mt = lua.create_table()?;
    mt.set("__index", lua.globals())?;
    env.set_metatable(Some(mt));

    Ok(env)
}

/// Build the `host` table handed to rules and actions.
///
/// A new table per call; scripts may scribble on it freely.
pub(crate) fn host_table(lua: &Lua, host: &HostSnapshot) -> mlua::Result<Table> {
    let t = lua.create_table()?;
    t.set("ip", host.addr.to_string())?;
    if let Some(name) = &host.name {
        t.set("name", name.as_str())?;
    }
    Ok(t)
}

/// Build the `port` table handed to rules and actions.
pub(crate) fn port_table(lua: &Lua, port: &PortSnapshot) -> mlua::Result<Table> {
    let t = lua.create_table()?;
    t.set("number", port.number)?;
    t.set("protocol", port.protocol.to_string())?;
    t.set("state", port.state.to_string())?;
    if let Some(service) = &port.service {
        t.set("service", service.as_str())?;
    }
    Ok(t)
}

/// Lua truthiness: everything except `nil` and `false`.
pub(crate) fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}
