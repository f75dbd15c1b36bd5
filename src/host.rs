// src/host.rs

//! Host and port records exchanged with the embedding scanner.
//!
//! The scanner owns the canonical host objects; the engine only ever sees
//! [`TargetHost`] references plus the opaque [`HostId`] it uses for timeout
//! bookkeeping. Each task receives its own [`HostSnapshot`] /
//! [`PortSnapshot`] copies, so a script mutating its view never leaks the
//! change into another task.

use std::fmt;
use std::net::IpAddr;

/// Opaque identity of a canonical host held by the scanner.
///
/// The engine never dereferences this; it is only passed back through the
/// [`ScanApi`](crate::api::ScanApi) timeout-clock and output-sink calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub u64);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

/// A scanned host as handed to [`ScriptEngine::run_scan`](crate::ScriptEngine::run_scan).
#[derive(Debug, Clone)]
pub struct TargetHost {
    pub id: HostId,
    pub addr: IpAddr,
    pub name: Option<String>,
}

impl TargetHost {
    /// Per-task copy of the host data.
    pub fn snapshot(&self) -> HostSnapshot {
        HostSnapshot {
            addr: self.addr,
            name: self.name.clone(),
        }
    }
}

/// Deep copy of host data owned by a single task.
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    pub addr: IpAddr,
    pub name: Option<String>,
}

/// Transport protocol of a scanned port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Observed state of a scanned port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Open,
    Filtered,
    Closed,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Filtered => write!(f, "filtered"),
            PortState::Closed => write!(f, "closed"),
        }
    }
}

/// Deep copy of one port record owned by a single task.
#[derive(Debug, Clone)]
pub struct PortSnapshot {
    pub number: u16,
    pub protocol: Protocol,
    pub state: PortState,
    pub service: Option<String>,
}
