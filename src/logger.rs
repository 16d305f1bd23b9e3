//! Console backend for the `log` facade.
//!
//! Lines are prefixed with `[Glossarly]`. Debug output can be toggled at
//! runtime; warnings and errors always pass.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::atomic::{AtomicBool, Ordering};

pub const PREFIX: &str = "[Glossarly]";

static DEBUG: AtomicBool = AtomicBool::new(true);
static LOGGER: ConsoleLogger = ConsoleLogger;

pub struct ConsoleLogger;

impl ConsoleLogger {
    fn format(record: &Record) -> String {
        format!("{} {}: {}", PREFIX, record.target(), record.args())
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn || DEBUG.load(Ordering::Relaxed)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);

        #[cfg(target_arch = "wasm32")]
        {
            let value = wasm_bindgen::JsValue::from_str(&line);
            match record.level() {
                Level::Error => web_sys::console::error_1(&value),
                Level::Warn => web_sys::console::warn_1(&value),
                _ => web_sys::console::log_1(&value),
            }
        }

        #[cfg(not(target_arch = "wasm32"))]
        eprintln!("{}", line);
    }

    fn flush(&self) {}
}

/// Install the console logger. Safe to call more than once.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
}

pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}
