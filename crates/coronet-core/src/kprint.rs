//! Kernel-style print macros for coronet
//!
//! Thread-safe, optionally-flushing diagnostic output on stderr.
//!
//! # Environment Variables
//!
//! - `CORONET_FLUSH_EPRINT=1` - flush stderr after each print
//! - `CORONET_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//!
//! # Usage
//!
//! ```ignore
//! use coronet_core::{kprintln, kwarn, kinfo};
//!
//! kprintln!("plain message");
//! kwarn!("unsupported events on fd {}", fd);
//! kinfo!("shutdown requested");
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize logging from environment variables
///
/// Called automatically on first log; call explicitly for deterministic
/// initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    FLUSH_ENABLED.store(
        crate::env::env_get_bool("CORONET_FLUSH_EPRINT", false),
        Ordering::Relaxed,
    );

    if let Ok(val) = std::env::var("CORONET_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

/// Emit a leveled message; no-op when below the configured level.
///
/// Used by the macros, not meant to be called directly.
#[doc(hidden)]
pub fn emit(level: LogLevel, args: core::fmt::Arguments<'_>) {
    if level > log_level() {
        return;
    }
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{} {}", level.prefix(), args);
    if flush_enabled() {
        let _ = err.flush();
    }
}

/// Emit an unconditional message (no level filtering)
#[doc(hidden)]
pub fn emit_plain(args: core::fmt::Arguments<'_>) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{}", args);
    if flush_enabled() {
        let _ = err.flush();
    }
}

#[macro_export]
macro_rules! kprintln {
    ($($arg:tt)*) => {
        $crate::kprint::emit_plain(::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {
        $crate::kprint::emit($crate::kprint::LogLevel::Error, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::kprint::emit($crate::kprint::LogLevel::Warn, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {
        $crate::kprint::emit($crate::kprint::LogLevel::Info, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {
        $crate::kprint::emit($crate::kprint::LogLevel::Debug, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {
        $crate::kprint::emit($crate::kprint::LogLevel::Trace, ::core::format_args!($($arg)*))
    };
}
