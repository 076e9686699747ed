//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PgcastSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Recognized environment variables:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `PG_USER` | `upstream.user` |
//! | `PG_HOST` | `upstream.host` |
//! | `PG_DATABASE` | `upstream.database` |
//! | `PG_PASSWORD` | `upstream.password` |
//! | `PG_PORT` | `upstream.port` |
//! | `PGCAST_CHANNEL` | `upstream.channel` |
//! | `PGCAST_HOST` | `server.host` |
//! | `PGCAST_PORT` | `server.port` |
//! | `PGCAST_LOG_LEVEL` | `logging.level` |
//! | `PGCAST_LOG_DIR` | `logging.directory` |

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::PgcastSettings;

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "PGCAST_SETTINGS";

/// Resolve the settings file path: `$PGCAST_SETTINGS`, else `~/.pgcast/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string(SETTINGS_PATH_ENV) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pgcast").join("settings.json")
}

/// Load settings from a specific path with process env overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PgcastSettings> {
    load_with_env(path, read_env_string)
}

/// Load from `path`, resolving environment variables through `lookup`.
pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<PgcastSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(PgcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PgcastSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, lookup);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment overrides, reading each variable through `lookup`.
///
/// Empty values are treated as unset. Out-of-range ports are ignored with a
/// warning and the file/default value is kept.
pub fn apply_env_overrides<F>(settings: &mut PgcastSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let port = |name: &str, min: u16| {
        let val = string(name)?;
        let parsed = parse_u16_range(&val, min, u16::MAX);
        if parsed.is_none() {
            tracing::warn!(key = name, value = %val, "invalid port env var, ignoring");
        }
        parsed
    };

    // ── Upstream ────────────────────────────────────────────────────
    if let Some(v) = string("PG_USER") {
        settings.upstream.user = v;
    }
    if let Some(v) = string("PG_HOST") {
        settings.upstream.host = v;
    }
    if let Some(v) = string("PG_DATABASE") {
        settings.upstream.database = v;
    }
    if let Some(v) = string("PG_PASSWORD") {
        settings.upstream.password = Some(v);
    }
    if let Some(v) = port("PG_PORT", 1) {
        settings.upstream.port = v;
    }
    if let Some(v) = string("PGCAST_CHANNEL") {
        settings.upstream.channel = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("PGCAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = port("PGCAST_PORT", 0) {
        settings.server.port = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("PGCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("PGCAST_LOG_DIR") {
        settings.logging.directory = Some(v);
    }
}

/// Reject settings the relay cannot run with.
pub fn validate(settings: &PgcastSettings) -> Result<()> {
    if settings.upstream.channel.trim().is_empty() {
        return Err(SettingsError::invalid("upstream.channel", "must not be empty"));
    }
    if settings.server.max_send_queue == 0 {
        return Err(SettingsError::invalid("server.maxSendQueue", "must be at least 1"));
    }
    if settings.server.heartbeat_interval_secs == 0 {
        return Err(SettingsError::invalid(
            "server.heartbeatIntervalSecs",
            "must be at least 1",
        ));
    }
    Ok(())
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
