// src/script/mod.rs

//! Script descriptors and everything that turns files on disk into them.
//!
//! A [`Script`] is loaded once and then shared read-only by all of its
//! tasks. The script's globals do *not* live here: the loader keeps the
//! chunk source so the body can be re-instantiated into a fresh
//! environment for every task.

use std::path::PathBuf;

use mlua::{Function, Lua, Table};

pub mod index;
pub mod loader;
pub mod selector;

pub use index::{IndexEntry, ScriptIndex};
pub use selector::select_scripts;

/// Immutable descriptor of one loaded script.
#[derive(Debug)]
pub struct Script {
    /// Absolute path the script was loaded from.
    pub filename: PathBuf,
    /// Final path component, e.g. `http-title.nse`.
    pub basename: String,
    /// Basename without the `.nse` suffix.
    pub short_basename: String,
    /// Identifier used in logs and output sinks (same as `short_basename`).
    pub id: String,
    /// Category tags, in declaration order.
    pub categories: Vec<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub description: String,
    /// Execution phase, ceiled to an integer, at least 1.
    pub runlevel: u32,
    /// Whether the body declared a callable `hostrule`.
    pub has_hostrule: bool,
    /// Whether the body declared a callable `portrule`.
    pub has_portrule: bool,
    source: String,
}

impl Script {
    /// Compile the retained body into `env`.
    ///
    /// Calling the returned function populates `env` with the script's
    /// top-level bindings; each task does this into its own environment.
    pub fn instantiate(&self, lua: &Lua, env: &Table) -> mlua::Result<Function> {
        lua.load(self.source.as_str())
            .set_name(self.basename.clone())
            .set_environment(env.clone())
            .into_function()
    }
}
