// src/engine/task.rs

//! Task construction and resumption.
//!
//! A task wraps one Lua coroutine built over the bootstrap below. The
//! first resume runs the script body into the task's private environment
//! and evaluates the applicability rule; the rule's result travels out as
//! the yield value, so the factory can decide whether the task exists at
//! all. The scheduler's first resume then enters the action with fresh
//! host/port copies.

use std::fmt;
use std::rc::Rc;

use mlua::{Function, Lua, MultiValue, Table, Thread, ThreadStatus, Value};
use tracing::debug;

use crate::engine::TaskId;
use crate::host::{HostId, HostSnapshot, PortSnapshot, TargetHost};
use crate::lua_api::{fresh_script_env, host_table, port_table, truthy};
use crate::script::{loader, Script};

const TASK_MAIN: &str = r#"
local yield = coroutine.yield
return function(body, env, kind, host, port)
    body()
    local rule
    if kind == "port" then
        rule = env.portrule
    else
        rule = env.hostrule
    end
    local h, p = yield(rule(host, port))
    return env.action(h, p)
end
"#;

/// Compile the shared coroutine entry point. Called once per engine.
pub(crate) fn compile_task_main(lua: &Lua) -> mlua::Result<Function> {
    lua.load(TASK_MAIN).set_name("task_main").eval()
}

/// Whether a task targets a whole host or one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Host,
    Port,
}

/// One suspended invocation of a script against a host or (host, port).
pub struct Task {
    pub id: TaskId,
    pub script: Rc<Script>,
    pub kind: TaskKind,
    /// Weak identity of the canonical host, for timeout bookkeeping.
    pub host_id: HostId,
    pub host: HostSnapshot,
    pub port: Option<PortSnapshot>,
    pub runlevel: u32,
    /// Arguments for the next resume, set at creation and by wake-ups.
    pub resume_args: MultiValue,
    thread: Thread,
    #[allow(dead_code)]
    env: Table,
}

/// What one resume step produced.
pub(crate) enum TaskStep {
    /// The task parked itself on an external wait.
    Yielded,
    /// The task ran to completion; the payload is the raw output bytes if
    /// the action returned a string.
    Finished(Option<Vec<u8>>),
}

impl Task {
    /// Advance the coroutine by one step, consuming the stored resume
    /// arguments.
    pub(crate) fn resume(&mut self) -> mlua::Result<TaskStep> {
        let args = std::mem::replace(&mut self.resume_args, MultiValue::new());
        let ret = self.thread.resume::<MultiValue>(args)?;
        if self.thread.status() == ThreadStatus::Resumable {
            return Ok(TaskStep::Yielded);
        }
        let output = match ret.into_iter().next() {
            Some(Value::String(s)) => Some(s.as_bytes().to_vec()),
            _ => None,
        };
        Ok(TaskStep::Finished(output))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.port {
            Some(port) => write!(
                f,
                "'{}' against {}:{}",
                self.script.id, self.host.addr, port.number
            ),
            None => write!(f, "'{}' against {}", self.script.id, self.host.addr),
        }
    }
}

/// Evaluate a script's applicability rule for one host (and port) and, on
/// a truthy result, produce the suspended task.
///
/// A rule that raises is logged and produces no task; the scan goes on.
pub(crate) fn build_task(
    lua: &Lua,
    task_main: &Function,
    script: &Rc<Script>,
    host: &TargetHost,
    port: Option<&PortSnapshot>,
    id: TaskId,
) -> Option<Task> {
    match try_build_task(lua, task_main, script, host, port, id) {
        Ok(task) => task,
        Err(err) => {
            let against = match port {
                Some(p) => format!("{}:{}", host.addr, p.number),
                None => host.addr.to_string(),
            };
            debug!(
                script = %script.id,
                against = %against,
                "rule evaluation failed: {err}"
            );
            None
        }
    }
}

fn try_build_task(
    lua: &Lua,
    task_main: &Function,
    script: &Rc<Script>,
    host: &TargetHost,
    port: Option<&PortSnapshot>,
    id: TaskId,
) -> mlua::Result<Option<Task>> {
    let snapshot = host.snapshot();
    let env = fresh_script_env(lua, &script.filename.display().to_string())?;
    let body = script.instantiate(lua, &env)?;
    let thread = lua.create_thread(task_main.clone())?;

    let kind_str = if port.is_some() { "port" } else { "host" };
    let rule_host = host_table(lua, &snapshot)?;
    let rule_port = match port {
        Some(p) => Value::Table(port_table(lua, p)?),
        None => Value::Nil,
    };

    // Runs the body and the rule; the rule result is the yield value.
    let yielded = thread.resume::<MultiValue>((body, env.clone(), kind_str, rule_host, rule_port))?;
    if thread.status() != ThreadStatus::Resumable {
        // The bootstrap never reached its yield; nothing to schedule.
        return Ok(None);
    }

    let rule_result = yielded.into_iter().next().unwrap_or(Value::Nil);
    if !truthy(&rule_result) {
        return Ok(None);
    }

    // The body may have overridden `runlevel` in its environment.
    let runlevel = loader::read_runlevel(&env).map_err(|_| {
        mlua::Error::RuntimeError("runlevel field became unreadable".to_string())
    })?;

    // Fresh copies for the action; the rule's tables stay with the rule.
    let action_host = host_table(lua, &snapshot)?;
    let action_port = match port {
        Some(p) => Value::Table(port_table(lua, p)?),
        None => Value::Nil,
    };
    let resume_args = MultiValue::from_vec(vec![Value::Table(action_host), action_port]);

    Ok(Some(Task {
        id,
        script: Rc::clone(script),
        kind: if port.is_some() {
            TaskKind::Port
        } else {
            TaskKind::Host
        },
        host_id: host.id,
        host: snapshot,
        port: port.cloned(),
        runlevel,
        resume_args,
        thread,
        env,
    }))
}
