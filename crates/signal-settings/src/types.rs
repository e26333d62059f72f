//! Gateway settings types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use signal_core::constants::{DEFAULT_CACHE_TTL, DEFAULT_RECONNECT_DELAY, DEFAULT_REPLAY_CAPACITY};

use crate::errors::{Result, SettingsError};

/// Output format of the stderr log layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Root settings for one gateway instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Base URL of the daemon's HTTP interface.
    pub daemon_url: String,
    /// Delay before reconnecting a lost event stream, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Idle time after which cached groups/identities are reloaded, in seconds.
    pub cache_ttl_secs: u64,
    /// Number of recent messages kept for late-joining listeners.
    pub replay_capacity: usize,
    /// TCP connect timeout for daemon connections, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl Default for GatewaySettings {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            daemon_url: "http://127.0.0.1:8080".to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
            connect_timeout_ms: 10_000,
            logging: LoggingSettings::default(),
        }
    }
}

impl GatewaySettings {
    /// Settings for `daemon_url` with every other value at its default.
    pub fn for_url(daemon_url: impl Into<String>) -> Self {
        Self {
            daemon_url: daemon_url.into(),
            ..Self::default()
        }
    }

    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Cache idle TTL as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.daemon_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("daemonUrl is empty".into()));
        }
        if self.replay_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "replayCapacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
