// src/lib.rs

//! # scanscript
//!
//! A cooperative, multi-script execution engine embedded in a network
//! scanner. Given user-selected script rules and scanned hosts, the
//! engine loads and validates Lua scripts, decides which apply to which
//! hosts and ports, and drives their actions as lightweight coroutine
//! tasks under per-host timeout supervision.
//!
//! The scanner stays in charge of all I/O: sockets, timeout clocks,
//! progress meters and output files are reached through the [`ScanApi`]
//! trait, and completed waits re-activate parked tasks through the
//! engine's [`Waker`] handle.
//!
//! ```no_run
//! use std::rc::Rc;
//! use scanscript::ScriptEngine;
//! # use scanscript::api::ScanApi;
//! # fn scanner_api() -> Rc<dyn ScanApi> { unimplemented!() }
//! # fn scanned_hosts() -> Vec<scanscript::host::TargetHost> { unimplemented!() }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = scanner_api();
//!     let rules = vec!["default".to_string(), "banner".to_string()];
//!
//!     let mut engine = ScriptEngine::new(api, &rules)?;
//!     engine.run_scan(&scanned_hosts())?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod args;
pub mod engine;
pub mod errors;
pub mod host;
pub mod logging;
pub mod lua_api;
pub mod sanitize;
pub mod script;

use std::fmt;
use std::rc::Rc;

use mlua::{Function, Lua};
use tracing::{debug, info};

use crate::api::ScanApi;
use crate::engine::task::{build_task, compile_task_main};
use crate::engine::{runlevels, Scheduler, TaskId, Waker};
use crate::errors::Result;
use crate::host::TargetHost;
use crate::script::{select_scripts, Script};

pub use crate::errors::EngineError;

/// The engine, constructed once per scanner run.
///
/// Construction resolves the rule list into loaded scripts and preloads
/// `--script-args`; [`ScriptEngine::run_scan`] is then invoked once per
/// scan with the hosts that came out of the port scanner.
pub struct ScriptEngine {
    lua: Lua,
    api: Rc<dyn ScanApi>,
    scripts: Vec<Rc<Script>>,
    waker: Waker,
    task_main: Function,
    next_task_id: u64,
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("scripts", &self.scripts.len())
            .finish_non_exhaustive()
    }
}

impl ScriptEngine {
    /// Load and validate every script the rules select.
    pub fn new(api: Rc<dyn ScanApi>, rules: &[String]) -> Result<Self> {
        let lua = Lua::new();
        lua_api::register_scan_table(&lua, &api)?;
        let task_main = compile_task_main(&lua)?;
        let scripts = select_scripts(&lua, api.as_ref(), rules)?;

        Ok(Self {
            lua,
            api,
            scripts,
            waker: Waker::default(),
            task_main,
            next_task_id: 0,
        })
    }

    /// The scripts selected at construction, in load order.
    pub fn scripts(&self) -> &[Rc<Script>] {
        &self.scripts
    }

    /// Re-activation handle for the scanner's I/O layer.
    pub fn waker(&self) -> Waker {
        self.waker.clone()
    }

    /// The Lua state scripts run in.
    ///
    /// The embedding scanner registers its socket and helper bindings
    /// here before the first scan.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Run every applicable script against `hosts` and deliver results
    /// through the output sinks.
    pub fn run_scan(&mut self, hosts: &[TargetHost]) -> Result<()> {
        let tasks = self.build_tasks(hosts);
        let buckets = runlevels::partition(tasks);

        for (runlevel, bucket) in buckets {
            debug!(runlevel, tasks = bucket.len(), "starting runlevel");
            Scheduler::new(&self.lua, Rc::clone(&self.api), self.waker.clone(), bucket).run();
        }

        info!("Script Scanning completed.");
        Ok(())
    }

    /// Evaluate applicability rules for every (script, host) and
    /// (script, host, port) combination and collect the resulting tasks.
    fn build_tasks(&mut self, hosts: &[TargetHost]) -> Vec<engine::Task> {
        let mut tasks = Vec::new();

        for host in hosts {
            for script in &self.scripts {
                if !script.has_hostrule {
                    continue;
                }
                let id = TaskId(self.next_task_id);
                self.next_task_id += 1;
                if let Some(task) = build_task(&self.lua, &self.task_main, script, host, None, id)
                {
                    tasks.push(task);
                }
            }

            for port in self.api.ports(host.id) {
                for script in &self.scripts {
                    if !script.has_portrule {
                        continue;
                    }
                    let id = TaskId(self.next_task_id);
                    self.next_task_id += 1;
                    if let Some(task) =
                        build_task(&self.lua, &self.task_main, script, host, Some(&port), id)
                    {
                        tasks.push(task);
                    }
                }
            }
        }

        tasks
    }
}
