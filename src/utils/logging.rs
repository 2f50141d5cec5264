//! Logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! The ingestion path runs once per sensor message (every couple of seconds
//! per device), so the chatty modules can be silenced individually without
//! touching `RUST_LOG`.
//!
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info, log_warn};
//!
//! log_info!("session opened at {}", started_at);
//! ```

/// Debug-level log line, emitted only when the calling module sets
/// `ENABLE_LOGS` to `true`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Info-level log line, see [`log_debug!`].
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level log line, see [`log_debug!`].
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}
