//! Tracing setup.
//!
//! The TUI owns stdout, so interactive runs log to a file next to the store. Headless runs
//! log to stderr. `RUST_LOG` overrides the configured filter.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub enum LogTarget<'a> {
    Stderr,
    /// Append to `playrun.log` inside this directory.
    File(&'a Path),
}

/// Install the global subscriber. Keep the returned guard alive until exit so buffered
/// lines are flushed.
pub fn init(level: &str, target: LogTarget<'_>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            None
        }
        LogTarget::File(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("log_dir_error: {e}");
                return None;
            }
            let appender = tracing_appender::rolling::never(dir, "playrun.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init();
            Some(guard)
        }
    }
}
