// src/logging.rs

//! Logging setup for `scanscript` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. the scanner's debug level (`-d`, `-dd`, ...) if provided
//! 2. `SCANSCRIPT_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for scan output.

use anyhow::Result;
use tracing_subscriber::fmt;

/// Initialise global logging subscriber from the scanner's debug level.
///
/// Safe to call once at startup.
pub fn init_logging(debug_level: Option<u32>) -> Result<()> {
    let level = match debug_level {
        Some(lvl) => level_from_debug(lvl),
        None => std::env::var("SCANSCRIPT_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::INFO),
    };

    // Send logs to stderr; keep stdout free for scan output.
    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn level_from_debug(lvl: u32) -> tracing::Level {
    match lvl {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
