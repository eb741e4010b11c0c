use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::OnceLock;

// Custom logger structure. Everything goes to Standard Error: Standard Output
// carries the "Arena URL = ..." line that the controller process reads.
#[derive(Debug)]
struct SimLogger {
    level: LevelFilter,
    debug_filters: Option<HashSet<String>>,
}

impl log::Log for SimLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.level() <= self.level {
            // If we have debug filters, check if the target matches any filter
            if let Some(filters) = &self.debug_filters {
                if metadata.level() == log::Level::Debug || metadata.level() == log::Level::Trace {
                    return filters.contains(metadata.target())
                        || filters.iter().any(|f| metadata.target().starts_with(f));
                }
            }
            return true;
        }
        false
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let level_color = match record.level() {
                log::Level::Error => "\x1B[31m", // Red
                log::Level::Warn => "\x1B[33m",  // Yellow
                log::Level::Info => "\x1B[32m",  // Green
                log::Level::Debug => "\x1B[36m", // Cyan
                log::Level::Trace => "\x1B[35m", // Magenta
            };
            let reset = "\x1B[0m";
            let timestamp = Local::now().format("%H:%M:%S%.3f");

            let mut stderr = io::stderr();
            writeln!(
                stderr,
                "{timestamp} {level_color}{level:5}{reset} {target}: {message}",
                timestamp = timestamp,
                level_color = level_color,
                level = record.level(),
                reset = reset,
                target = record.target(),
                message = record.args()
            )
            .expect("Failed to write to stderr");
            stderr.flush().expect("Failed to flush stderr");
        }
    }

    fn flush(&self) {
        io::stderr().flush().expect("Failed to flush stderr");
    }
}

static LOGGER: OnceLock<SimLogger> = OnceLock::new();

// Initialize the logger with optional debug filters
pub fn init_logger(level: LevelFilter, debug_filter: Option<String>) -> Result<(), SetLoggerError> {
    let debug_filters = debug_filter.map(|filter_str| {
        filter_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect::<HashSet<String>>()
    });

    if LOGGER.get().is_none() {
        let logger = SimLogger {
            level,
            debug_filters,
        };
        LOGGER.set(logger).expect("Failed to set logger");
    }

    log::set_logger(LOGGER.get().unwrap()).map(|()| log::set_max_level(level))
}

// Helper macros for specific debug topics

#[macro_export]
macro_rules! debug_sched {
    ($($arg:tt)*) => {
        log::debug!(target: "sched", "{}", format_args!($($arg)*))
    }
}

#[macro_export]
macro_rules! debug_vision {
    ($($arg:tt)*) => {
        log::debug!(target: "vision", "{}", format_args!($($arg)*))
    }
}

#[macro_export]
macro_rules! debug_rpc {
    ($($arg:tt)*) => {
        log::debug!(target: "rpc", "{}", format_args!($($arg)*))
    }
}
