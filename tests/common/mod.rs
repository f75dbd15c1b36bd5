#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Once;

use mlua::MultiValue;
use tracing_subscriber::{fmt, EnvFilter};

use scanscript::api::{PathKind, ProgressMeter, ScanApi};
use scanscript::engine::{TaskId, Waker};
use scanscript::errors::Result;
use scanscript::host::{HostId, PortSnapshot, PortState, Protocol, TargetHost};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing**
///   tests (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

pub fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Write a script index file mapping categories to script filenames.
pub fn write_index(dbpath: &Path, entries: &[(&str, &str)]) {
    fs::write(dbpath, index_toml(entries)).unwrap();
}

pub fn index_toml(entries: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (category, filename) in entries {
        out.push_str("[[entry]]\n");
        out.push_str(&format!("category = \"{category}\"\n"));
        out.push_str(&format!("filename = \"{filename}\"\n\n"));
    }
    out
}

pub fn open_port(number: u16) -> PortSnapshot {
    PortSnapshot {
        number,
        protocol: Protocol::Tcp,
        state: PortState::Open,
        service: None,
    }
}

pub fn target(id: u64, addr: &str) -> TargetHost {
    TargetHost {
        id: HostId(id),
        addr: addr.parse().unwrap(),
        name: None,
    }
}

/// Records every progress call made through it; shared by reference so
/// tests can assert after the scan.
#[derive(Default)]
pub struct MeterLog {
    pub printed: RefCell<Vec<f64>>,
    pub ended: RefCell<u32>,
}

struct SharedMeter(Rc<MeterLog>);

impl ProgressMeter for SharedMeter {
    fn print_stats(&self, frac: f64) {
        self.0.printed.borrow_mut().push(frac);
    }

    fn print_stats_if_necessary(&self, frac: f64) {
        self.0.printed.borrow_mut().push(frac);
    }

    fn may_be_printed(&self) -> bool {
        false
    }

    fn end_task(&self) {
        *self.0.ended.borrow_mut() += 1;
    }
}

/// A fake scanner backend.
///
/// - resolves paths against a temp directory
/// - counts I/O ticks and simulates host timeouts / wake-ups at
///   configured tick numbers
/// - records timeout-clock operations and everything written to the
///   output sinks
pub struct FakeApi {
    pub root: PathBuf,
    pub dbpath: PathBuf,
    pub default_mode: bool,
    pub scriptversion: bool,
    pub scriptargs: Option<String>,
    /// When set, `updatedb()` writes this into `dbpath` and succeeds.
    pub rebuild_contents: RefCell<Option<String>>,
    pub ports: HashMap<u64, Vec<PortSnapshot>>,
    /// Host id -> tick at (and after) which the host counts as timed out.
    pub timeout_after: RefCell<HashMap<u64, u64>>,
    pub tick: RefCell<u64>,
    pub waker: RefCell<Option<Waker>>,
    /// At the given tick, wake task ids 0..64 with these resume args.
    pub wake_at_tick: RefCell<Option<(u64, MultiValue)>>,
    pub host_outputs: RefCell<Vec<(u64, String, String)>>,
    pub port_outputs: RefCell<Vec<(u64, u16, String, String)>>,
    pub clock_starts: RefCell<Vec<u64>>,
    pub clock_stops: RefCell<Vec<u64>>,
    pub meter: Rc<MeterLog>,
}

impl FakeApi {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dbpath: root.join("script.db"),
            default_mode: false,
            scriptversion: false,
            scriptargs: None,
            rebuild_contents: RefCell::new(None),
            ports: HashMap::new(),
            timeout_after: RefCell::new(HashMap::new()),
            tick: RefCell::new(0),
            waker: RefCell::new(None),
            wake_at_tick: RefCell::new(None),
            host_outputs: RefCell::new(Vec::new()),
            port_outputs: RefCell::new(Vec::new()),
            clock_starts: RefCell::new(Vec::new()),
            clock_stops: RefCell::new(Vec::new()),
            meter: Rc::new(MeterLog::default()),
        }
    }
}

impl ScanApi for FakeApi {
    fn fetchfile_absolute(&self, path: &Path) -> Option<(PathKind, PathBuf)> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let meta = fs::metadata(&absolute).ok()?;
        if meta.is_dir() {
            Some((PathKind::Directory, absolute))
        } else {
            Some((PathKind::File, absolute))
        }
    }

    fn updatedb(&self) -> bool {
        match &*self.rebuild_contents.borrow() {
            Some(contents) => fs::write(&self.dbpath, contents).is_ok(),
            None => false,
        }
    }

    fn script_dbpath(&self) -> PathBuf {
        self.dbpath.clone()
    }

    fn scriptversion(&self) -> bool {
        self.scriptversion
    }

    fn default_mode(&self) -> bool {
        self.default_mode
    }

    fn scriptargs(&self) -> Option<String> {
        self.scriptargs.clone()
    }

    fn scan_progress_meter(&self, _name: &str) -> Box<dyn ProgressMeter> {
        Box::new(SharedMeter(Rc::clone(&self.meter)))
    }

    fn nsock_loop(&self, _ms: u64) {
        let now = {
            let mut tick = self.tick.borrow_mut();
            *tick += 1;
            *tick
        };

        let args = match &*self.wake_at_tick.borrow() {
            Some((at, args)) if *at == now => Some(args.clone()),
            _ => None,
        };
        if let (Some(args), Some(waker)) = (args, &*self.waker.borrow()) {
            // Blind fan-out: wake-ups for unknown ids must be ignored.
            for id in 0..64 {
                waker.wake(TaskId(id), args.clone());
            }
        }
    }

    fn key_was_pressed(&self) -> bool {
        false
    }

    fn ports(&self, host: HostId) -> Vec<PortSnapshot> {
        self.ports.get(&host.0).cloned().unwrap_or_default()
    }

    fn start_timeout_clock(&self, host: HostId) {
        self.clock_starts.borrow_mut().push(host.0);
    }

    fn stop_timeout_clock(&self, host: HostId) {
        self.clock_stops.borrow_mut().push(host.0);
    }

    fn timed_out(&self, host: HostId) -> bool {
        let now = *self.tick.borrow();
        self.timeout_after
            .borrow()
            .get(&host.0)
            .map(|&at| now >= at)
            .unwrap_or(false)
    }

    fn host_set_output(&self, host: HostId, script_id: &str, text: &str) {
        self.host_outputs
            .borrow_mut()
            .push((host.0, script_id.to_string(), text.to_string()));
    }

    fn port_set_output(&self, host: HostId, port: &PortSnapshot, script_id: &str, text: &str) {
        self.port_outputs.borrow_mut().push((
            host.0,
            port.number,
            script_id.to_string(),
            text.to_string(),
        ));
    }

    fn dump_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    fn verbosity(&self) -> u32 {
        0
    }

    fn debugging(&self) -> u32 {
        0
    }
}
