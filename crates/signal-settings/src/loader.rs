//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GatewaySettings::default()`]
//! 2. If `~/.signal-gateway/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SIGNAL_GATEWAY_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::GatewaySettings;

/// Environment variable overriding the daemon URL.
pub const ENV_DAEMON_URL: &str = "SIGNAL_GATEWAY_DAEMON_URL";
/// Environment variable overriding the reconnect delay (ms).
pub const ENV_RECONNECT_DELAY_MS: &str = "SIGNAL_GATEWAY_RECONNECT_DELAY_MS";
/// Environment variable overriding the cache TTL (s).
pub const ENV_CACHE_TTL_SECS: &str = "SIGNAL_GATEWAY_CACHE_TTL_SECS";
/// Environment variable overriding the replay capacity.
pub const ENV_REPLAY_CAPACITY: &str = "SIGNAL_GATEWAY_REPLAY_CAPACITY";
/// Environment variable overriding the log level.
pub const ENV_LOG_LEVEL: &str = "SIGNAL_GATEWAY_LOG_LEVEL";

/// Resolve the path to the settings file (`~/.signal-gateway/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home)
        .join(".signal-gateway")
        .join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<GatewaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, defaults are used. If the file contains
/// invalid JSON, or the merged result fails validation, an error is returned.
pub fn load_settings_from_path(path: &Path) -> Result<GatewaySettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Read `path` deep-merged over defaults, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<GatewaySettings> {
    let defaults = serde_json::to_value(GatewaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut GatewaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are ignored; out-of-range or unparsable numbers are logged
/// and ignored (falling back to file/default).
pub fn apply_overrides_from<F>(settings: &mut GatewaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = read(ENV_DAEMON_URL) {
        settings.daemon_url = v;
    }
    if let Some(v) = read(ENV_RECONNECT_DELAY_MS) {
        match parse_u64_range(&v, 10, 600_000) {
            Some(n) => settings.reconnect_delay_ms = n,
            None => warn_invalid(ENV_RECONNECT_DELAY_MS, &v),
        }
    }
    if let Some(v) = read(ENV_CACHE_TTL_SECS) {
        match parse_u64_range(&v, 1, 7 * 24 * 3600) {
            Some(n) => settings.cache_ttl_secs = n,
            None => warn_invalid(ENV_CACHE_TTL_SECS, &v),
        }
    }
    if let Some(v) = read(ENV_REPLAY_CAPACITY) {
        match parse_usize_range(&v, 1, 1_000_000) {
            Some(n) => settings.replay_capacity = n,
            None => warn_invalid(ENV_REPLAY_CAPACITY, &v),
        }
    }
    if let Some(v) = read(ENV_LOG_LEVEL) {
        settings.logging.level = v;
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid numeric env var, ignoring");
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let merged = deep_merge(
            serde_json::json!({"a": 1, "b": 2}),
            serde_json::json!({"a": 10}),
        );
        assert_eq!(merged["a"], 10);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_nested_keeps_siblings() {
        let merged = deep_merge(
            serde_json::json!({"logging": {"level": "info", "format": "compact"}}),
            serde_json::json!({"logging": {"format": "json"}}),
        );
        assert_eq!(merged["logging"]["level"], "info");
        assert_eq!(merged["logging"]["format"], "json");
    }

    #[test]
    fn merge_skips_null() {
        let merged = deep_merge(
            serde_json::json!({"daemonUrl": "http://a"}),
            serde_json::json!({"daemonUrl": null}),
        );
        assert_eq!(merged["daemonUrl"], "http://a");
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, GatewaySettings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"daemonUrl": "http://signal:7583", "logging": {"format": "json"}}"#,
        )
        .unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.daemon_url, "http://signal:7583");
        assert_eq!(settings.logging.format, crate::LogFormat::Json);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.reconnect_delay_ms, 5000);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            read_settings_file(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn invalid_merged_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"replayCapacity": 0}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut s = GatewaySettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                (ENV_DAEMON_URL, "http://override:1"),
                (ENV_RECONNECT_DELAY_MS, "250"),
                (ENV_CACHE_TTL_SECS, "60"),
                (ENV_REPLAY_CAPACITY, "50"),
                (ENV_LOG_LEVEL, "debug"),
            ]),
        );
        assert_eq!(s.daemon_url, "http://override:1");
        assert_eq!(s.reconnect_delay_ms, 250);
        assert_eq!(s.cache_ttl_secs, 60);
        assert_eq!(s.replay_capacity, 50);
        assert_eq!(s.logging.level, "debug");
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut s = GatewaySettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                (ENV_RECONNECT_DELAY_MS, "soon"),
                (ENV_REPLAY_CAPACITY, "0"),
                (ENV_DAEMON_URL, "   "),
            ]),
        );
        assert_eq!(s, GatewaySettings::default());
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("42", 1, 100), Some(42));
        assert_eq!(parse_u64_range("0", 1, 100), None);
        assert_eq!(parse_u64_range("abc", 1, 100), None);
        assert_eq!(parse_usize_range(" 7 ", 1, 10), Some(7));
    }
}
