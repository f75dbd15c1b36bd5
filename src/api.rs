// src/api.rs

//! Interface between the engine and its embedding scanner.
//!
//! The engine never touches sockets, clocks or output files itself; it
//! talks to a [`ScanApi`] implementation instead. Production code wires
//! this to the scanner internals; tests supply a fake that simulates
//! I/O completion and timeouts without any network.

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::host::{HostId, PortSnapshot};

/// What a path resolved to on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// Handle to one of the scanner's console progress meters.
pub trait ProgressMeter {
    /// Print progress unconditionally.
    fn print_stats(&self, frac: f64);
    /// Print progress only if the meter's own rate limiting allows it.
    fn print_stats_if_necessary(&self, frac: f64);
    /// Whether the meter wants an update this round.
    fn may_be_printed(&self) -> bool;
    /// Tell the meter the task it was tracking is finished.
    fn end_task(&self);
}

/// Services the embedding scanner provides to the engine.
///
/// All methods take `&self`; implementations that need mutable state use
/// interior mutability (everything runs on one thread).
pub trait ScanApi {
    /// Resolve a (possibly relative) path against the scanner's search
    /// directories. Returns the kind and the absolute path, or `None` if
    /// nothing was found.
    fn fetchfile_absolute(&self, path: &Path) -> Option<(PathKind, PathBuf)>;

    /// (Re)generate the script index. Returns `true` on success.
    fn updatedb(&self) -> bool;

    /// Location of the script index file.
    fn script_dbpath(&self) -> PathBuf;

    /// Whether the scanner runs in version-detection mode.
    fn scriptversion(&self) -> bool;

    /// Whether the scanner's default-script mode is on.
    fn default_mode(&self) -> bool;

    /// Raw `--script-args` string, if any.
    fn scriptargs(&self) -> Option<String>;

    /// Create a console progress meter named `name`.
    fn scan_progress_meter(&self, name: &str) -> Box<dyn ProgressMeter>;

    /// Drive the asynchronous I/O layer for up to `ms` milliseconds.
    /// Completed waits are reported back through the engine's
    /// [`Waker`](crate::engine::Waker) during this call.
    fn nsock_loop(&self, ms: u64);

    /// Whether the operator pressed the status key since the last check.
    fn key_was_pressed(&self) -> bool;

    /// Ports of interest for the given host.
    fn ports(&self, host: HostId) -> Vec<PortSnapshot>;

    fn start_timeout_clock(&self, host: HostId);
    fn stop_timeout_clock(&self, host: HostId);
    fn timed_out(&self, host: HostId) -> bool;

    /// Record a host-level script result.
    fn host_set_output(&self, host: HostId, script_id: &str, text: &str);

    /// Record a port-level script result.
    fn port_set_output(&self, host: HostId, port: &PortSnapshot, script_id: &str, text: &str);

    /// Enumerate the files of a directory as absolute paths.
    fn dump_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Operator verbosity level (`-v` count).
    fn verbosity(&self) -> u32;

    /// Operator debug level (`-d` count).
    fn debugging(&self) -> u32;
}
