//! # signal-logging
//!
//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the global stderr subscriber in compact or
//!   JSON format, filtered by `RUST_LOG` or the configured level.
//! - [`capture_logs`] installs a thread-local capturing subscriber for tests
//!   that assert on gateway diagnostics (swallowed listener errors, reconnect
//!   warnings, dropped events).

#![deny(unsafe_code)]

pub mod test_utils;

use signal_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::EnvFilter;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_subscriber(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a global default is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
}

/// Initialize from a [`LoggingSettings`] block.
pub fn init_from_settings(settings: &LoggingSettings) {
    init_subscriber(&settings.level, settings.format);
}
