//! # signal-settings
//!
//! Configuration for the Signal daemon gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GatewaySettings::default()`]
//! 2. **User file**: `~/.signal-gateway/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SIGNAL_GATEWAY_*` overrides (highest priority)
//!
//! The core gateway needs only the daemon base URL; the remaining values tune
//! reconnect timing, cache lifetime, replay depth and logging.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{GatewaySettings, LogFormat, LoggingSettings};
