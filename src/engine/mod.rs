// src/engine/mod.rs

//! Cooperative execution engine.
//!
//! This module ties together:
//! - the task factory (rule evaluation, per-task environments)
//! - the runlevel partitioner
//! - the scheduler loop that interleaves task progress with the external
//!   I/O layer and enforces per-host timeouts
//!
//! Tasks are Lua coroutines; exactly one is on the CPU at any time. The
//! I/O layer re-activates parked tasks through the [`Waker`] handle.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use mlua::MultiValue;

pub mod runlevels;
pub mod scheduler;
pub mod task;

pub use scheduler::Scheduler;
pub use task::{Task, TaskKind};

/// Engine-wide task identity, also used in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Default)]
struct WakerState {
    queue: Vec<(TaskId, MultiValue)>,
    current: Option<TaskId>,
}

/// Re-activation hook handed to the external I/O layer.
///
/// When a wait completes, the I/O layer calls [`Waker::wake`] with the
/// task's identity and the values the task should resume with. Wake-ups
/// for unknown or non-waiting tasks are ignored. [`Waker::current_task`]
/// reports which task is on the CPU, so I/O bindings can key their
/// requests while a script is inside a call.
#[derive(Clone, Default)]
pub struct Waker {
    inner: Rc<RefCell<WakerState>>,
}

impl Waker {
    /// Queue a wake-up for `task`, to be applied by the scheduler on its
    /// next pass. `args` become the task's resume arguments.
    pub fn wake(&self, task: TaskId, args: MultiValue) {
        self.inner.borrow_mut().queue.push((task, args));
    }

    /// Identity of the task currently on the CPU, if any.
    pub fn current_task(&self) -> Option<TaskId> {
        self.inner.borrow().current
    }

    pub(crate) fn set_current(&self, task: Option<TaskId>) {
        self.inner.borrow_mut().current = task;
    }

    pub(crate) fn drain(&self) -> Vec<(TaskId, MultiValue)> {
        std::mem::take(&mut self.inner.borrow_mut().queue)
    }
}
