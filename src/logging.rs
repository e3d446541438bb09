//! Logging setup and per-run log capture
//!
//! Console output goes through `env_logger`. While a run is in progress the
//! same records (info and above) are also collected so they can be stored
//! in the run report. Capture is per thread; a run never leaves its thread.

use anyhow::{Context, Result};
use chrono::Utc;
use declarative::LogEntry;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;

/// Least severe level recorded into reports
const CAPTURE_LEVEL: Level = Level::Info;

thread_local! {
    static CAPTURE: RefCell<Option<Vec<LogEntry>>> = const { RefCell::new(None) };
}

/// Console level for the `-v`/`-q` flags
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the global logger
pub fn init(verbose: u8, quiet: bool) -> Result<()> {
    let console = env_logger::Builder::new()
        .filter_level(level_for(verbose, quiet))
        .format_timestamp(None)
        .parse_default_env()
        .build();

    let max = console.filter().max(CAPTURE_LEVEL.to_level_filter());
    log::set_boxed_logger(Box::new(CapturingLogger { console }))
        .context("Failed to install logger")?;
    log::set_max_level(max);
    Ok(())
}

struct CapturingLogger {
    console: env_logger::Logger,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata) || (metadata.level() <= CAPTURE_LEVEL && is_capturing())
    }

    fn log(&self, record: &Record<'_>) {
        capture(record);
        if self.console.matches(record) {
            self.console.log(record);
        }
    }

    fn flush(&self) {
        self.console.flush();
    }
}

fn is_capturing() -> bool {
    CAPTURE.with(|c| c.borrow().is_some())
}

fn capture(record: &Record<'_>) {
    if record.level() > CAPTURE_LEVEL {
        return;
    }
    CAPTURE.with(|c| {
        if let Some(entries) = c.borrow_mut().as_mut() {
            entries.push(LogEntry {
                time: Utc::now(),
                level: record.level().as_str().to_lowercase(),
                source: record.target().to_string(),
                message: record.args().to_string(),
            });
        }
    });
}

/// Collects log records on this thread until finished or dropped
#[derive(Debug)]
pub struct LogCapture {
    _private: (),
}

impl LogCapture {
    /// Start collecting; any unfinished capture on this thread is discarded
    pub fn start() -> Self {
        CAPTURE.with(|c| *c.borrow_mut() = Some(Vec::new()));
        Self { _private: () }
    }

    /// Stop collecting and return what was recorded
    pub fn finish(self) -> Vec<LogEntry> {
        CAPTURE.with(|c| c.borrow_mut().take()).unwrap_or_default()
    }
}

impl Drop for LogCapture {
    fn drop(&mut self) {
        CAPTURE.with(|c| *c.borrow_mut() = None);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Once;

    /// Route records into [`LogCapture`] with console output switched off
    pub fn install() {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            let console = env_logger::Builder::new()
                .filter_level(LevelFilter::Off)
                .build();
            if log::set_boxed_logger(Box::new(CapturingLogger { console })).is_ok() {
                log::set_max_level(CAPTURE_LEVEL.to_level_filter());
            }
        });
    }

    /// Captured entries at `level` whose message contains `needle`
    pub fn count(entries: &[LogEntry], level: Level, needle: &str) -> usize {
        let level = level.as_str().to_lowercase();
        entries
            .iter()
            .filter(|e| e.level == level && e.message.contains(needle))
            .count()
    }
}
