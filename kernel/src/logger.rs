//! `log` crate front-end
//!
//! Wires the standard [`log`] facade up to [`crate::log_service`]: every
//! `log::info!`/`log::warn!`/etc. call is captured into the circular
//! buffer and mirrored to the serial console.

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::log_service::{self, LogLevel};

struct Logger;

static LOGGER: Logger = Logger;

fn to_log_level(level: Level) -> LogLevel {
    match level {
        Level::Error => LogLevel::Error,
        Level::Warn => LogLevel::Warn,
        Level::Info => LogLevel::Info,
        Level::Debug => LogLevel::Debug,
        Level::Trace => LogLevel::Trace,
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let subsystem = record.target();
        let message = record.args();
        println!("[{subsystem}] {}: {message}", record.level());
        log_service::klog_fmt(to_log_level(record.level()), subsystem, *message);
    }

    fn flush(&self) {}
}

/// Install the kernel logger as the global `log` facade. Must be called
/// exactly once, early in boot.
pub fn init(max_level: LevelFilter) {
    // SAFETY: LOGGER is a unit struct with no interior state to race on;
    // `set_logger` is documented safe to call once and this runs exactly
    // once from `vm_bootstrap`'s caller before any other code logs.
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(max_level))
        .expect("logger must be initialized exactly once");
}
