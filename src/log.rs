//! Utilities for logging messages from the converter.
//!
//! Everything goes to stderr, since stdout may be carrying the converted image.

use once_cell::sync::Lazy;

/// Prints a debug message when `RSVG_CONVERT_LOG` is set in the environment.
#[macro_export]
macro_rules! convert_log {
    (
        $($arg:tt)+
    ) => {
        if $crate::log::log_enabled() {
            eprintln!("rsvg-convert: {}", format_args!($($arg)+));
        }
    };
}

/// Prints a warning unconditionally.
#[macro_export]
macro_rules! convert_warn {
    (
        $($arg:tt)+
    ) => {
        eprintln!("rsvg-convert: warning: {}", format_args!($($arg)+));
    };
}

pub fn log_enabled() -> bool {
    static ENABLED: Lazy<bool> =
        Lazy::new(|| ::std::env::var_os(crate::config::LOG_VAR).is_some());

    *ENABLED
}
