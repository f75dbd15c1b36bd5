// src/engine/scheduler.rs

//! The cooperative scheduler loop for one runlevel.
//!
//! Three disjoint sets partition the live tasks:
//! - `running`: next step is an immediate resume
//! - `waiting`: parked on an external wait
//! - `pending`: marked for re-activation by a wake-up, drained into
//!   `running` once per outer iteration
//!
//! Per host, `hosts` tracks the identities of live tasks so the host's
//! timeout clock can be stopped when its last task terminates.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use mlua::Lua;
use tracing::{debug, info, trace};

use crate::api::{ProgressMeter, ScanApi};
use crate::engine::task::{Task, TaskKind, TaskStep};
use crate::engine::{TaskId, Waker};
use crate::host::HostId;
use crate::sanitize::sanitize_output;

/// Budget for one tick of the external I/O layer.
const NSOCK_TICK_MS: u64 = 50;

pub struct Scheduler<'a> {
    lua: &'a Lua,
    api: Rc<dyn ScanApi>,
    waker: Waker,
    tasks: HashMap<TaskId, Task>,
    running: BTreeSet<TaskId>,
    waiting: BTreeSet<TaskId>,
    pending: BTreeSet<TaskId>,
    hosts: HashMap<HostId, HashSet<TaskId>>,
    total: usize,
    completed: usize,
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(
        lua: &'a Lua,
        api: Rc<dyn ScanApi>,
        waker: Waker,
        bucket: Vec<Task>,
    ) -> Self {
        let total = bucket.len();
        let mut tasks = HashMap::new();
        let mut running = BTreeSet::new();
        let mut hosts: HashMap<HostId, HashSet<TaskId>> = HashMap::new();

        for task in bucket {
            running.insert(task.id);
            hosts.entry(task.host_id).or_default().insert(task.id);
            tasks.insert(task.id, task);
        }

        Self {
            lua,
            api,
            waker,
            tasks,
            running,
            waiting: BTreeSet::new(),
            pending: BTreeSet::new(),
            hosts,
            total,
            completed: 0,
        }
    }

    /// Drive every task of this runlevel to termination.
    pub(crate) fn run(mut self) {
        let meter = self.api.scan_progress_meter("NSE");

        while !self.running.is_empty() || !self.waiting.is_empty() {
            self.api.nsock_loop(NSOCK_TICK_MS);
            self.apply_wakes();
            self.report_progress(meter.as_ref());
            self.sweep_timeouts();
            self.run_ready();
            self.promote_pending();
            if let Err(err) = self.lua.gc_collect() {
                debug!("lua gc hint failed: {err}");
            }
        }

        meter.end_task();
    }

    /// Move queued wake-ups from `waiting` into `pending`, storing their
    /// resume arguments. Wake-ups for unknown or non-waiting tasks are
    /// ignored.
    fn apply_wakes(&mut self) {
        for (id, args) in self.waker.drain() {
            if !self.waiting.remove(&id) {
                trace!(task = %id, "ignoring wake-up for non-waiting task");
                continue;
            }
            if let Some(task) = self.tasks.get_mut(&id) {
                task.resume_args = args;
            }
            self.pending.insert(id);
        }
    }

    fn report_progress(&self, meter: &dyn ProgressMeter) {
        let frac = if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        };

        if self.api.key_was_pressed() {
            let active = self.running.len() + self.waiting.len() + self.pending.len();
            info!("Active threads: {} ({} waiting)", active, self.waiting.len());
            meter.print_stats(frac);
        } else if self.api.verbosity() > 1 || self.api.debugging() > 0 {
            meter.print_stats(frac);
        } else if meter.may_be_printed() {
            meter.print_stats_if_necessary(frac);
        }
    }

    /// Drop waiting tasks whose host ran out of time.
    fn sweep_timeouts(&mut self) {
        let snapshot: Vec<TaskId> = self.waiting.iter().copied().collect();
        for id in snapshot {
            let host_id = match self.tasks.get(&id) {
                Some(task) => task.host_id,
                None => continue,
            };
            if !self.api.timed_out(host_id) {
                continue;
            }
            self.waiting.remove(&id);
            if let Some(task) = self.tasks.remove(&id) {
                debug!("{task} target timed out");
            }
            // The dead identity stays in the host's live set; only normal
            // termination and script errors release it there.
            self.completed += 1;
        }
    }

    /// Resume every task that is ready to run.
    fn run_ready(&mut self) {
        let snapshot: Vec<TaskId> = self.running.iter().copied().collect();
        for id in snapshot {
            let (host_id, step) = {
                let task = match self.tasks.get_mut(&id) {
                    Some(task) => task,
                    None => continue,
                };
                let host_id = task.host_id;
                self.api.start_timeout_clock(host_id);
                self.waker.set_current(Some(id));
                let step = task.resume();
                self.waker.set_current(None);
                (host_id, step)
            };

            match step {
                Ok(TaskStep::Yielded) => {
                    self.running.remove(&id);
                    self.waiting.insert(id);
                }
                Ok(TaskStep::Finished(output)) => {
                    self.running.remove(&id);
                    if let Some(task) = self.tasks.remove(&id) {
                        self.deliver(&task, output);
                    }
                    self.release_from_host(id, host_id);
                    self.completed += 1;
                }
                Err(err) => {
                    self.running.remove(&id);
                    if let Some(task) = self.tasks.remove(&id) {
                        debug!("{task} threw an error: {err}");
                    }
                    self.release_from_host(id, host_id);
                    self.completed += 1;
                }
            }
        }
    }

    /// Sanitize a finished task's output and hand it to the matching sink.
    fn deliver(&self, task: &Task, output: Option<Vec<u8>>) {
        let Some(bytes) = output else { return };
        let text = sanitize_output(&bytes);
        match task.kind {
            TaskKind::Host => self.api.host_set_output(task.host_id, &task.script.id, &text),
            TaskKind::Port => {
                if let Some(port) = &task.port {
                    self.api
                        .port_set_output(task.host_id, port, &task.script.id, &text);
                }
            }
        }
        debug!("{task} completed with output");
    }

    /// Drop a terminated task from its host's live set, stopping the
    /// host's timeout clock if the set became empty.
    fn release_from_host(&mut self, id: TaskId, host_id: HostId) {
        if let Some(live) = self.hosts.get_mut(&host_id) {
            live.remove(&id);
            if live.is_empty() {
                self.hosts.remove(&host_id);
                self.api.stop_timeout_clock(host_id);
            }
        }
    }

    /// Activate everything a wake-up marked for re-activation.
    fn promote_pending(&mut self) {
        self.apply_wakes();
        while let Some(id) = self.pending.pop_first() {
            self.running.insert(id);
        }
    }
}
