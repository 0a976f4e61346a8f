//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If a settings file is given and exists, deep-merge its values over defaults
//! 3. Apply `COURIER_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::duration::parse_duration;
use crate::errors::Result;
use crate::types::{DeliveryMode, GateMode, RelaySettings, TransportSettings};

/// Load settings from an optional file with env var overrides.
///
/// With no path, only defaults and the environment are consulted.
pub fn load_settings(path: Option<&Path>) -> Result<RelaySettings> {
    match path {
        Some(path) => load_settings_from_path(path),
        None => {
            let mut settings = RelaySettings::default();
            apply_env_overrides(&mut settings);
            Ok(settings)
        }
    }
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let settings: RelaySettings = serde_json::from_value(merged)?;
    settings.validate()?;
    Ok(settings)
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

/// Apply `COURIER_*` environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, &|name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Separated from the process
/// environment so the rules can be tested without mutating it.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: &dyn Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("COURIER_LISTEN") {
        settings.server.listen = v;
    }
    if let Some(v) = env.usize("COURIER_MAX_BODY", 1, 256 * 1024 * 1024) {
        settings.server.max_body_bytes = v;
    }

    // ── Transport ───────────────────────────────────────────────────
    if let Some(v) = env.usize("COURIER_READ_BUFFER", 1, 64 * 1024 * 1024) {
        settings.transport.read_buffer_size = v;
    }
    if let Some(v) = env.usize("COURIER_WRITE_BUFFER", 1, 64 * 1024 * 1024) {
        settings.transport.write_buffer_size = v;
    }
    if let Some(v) = env.timeout_secs("COURIER_TIMEOUT") {
        settings.transport.timeout_secs = v;
    }

    // ── Cache ───────────────────────────────────────────────────────
    if let Some(v) = env.duration("COURIER_CACHE_TTL") {
        settings.cache.ttl_ms = u64::try_from(v.as_millis()).unwrap_or(u64::MAX).max(1);
    }

    // ── Delivery / gate ─────────────────────────────────────────────
    if let Some(v) = env.parsed::<DeliveryMode>("COURIER_DELIVERY") {
        settings.delivery.mode = v;
    }
    if let Some(v) = env.usize("COURIER_CHANNEL_CAPACITY", 1, 1_000_000) {
        settings.delivery.channel_capacity = v;
    }
    if let Some(v) = env.parsed::<GateMode>("COURIER_GATE") {
        settings.gate.mode = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("COURIER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("COURIER_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }

    fn duration(&self, name: &str) -> Option<std::time::Duration> {
        let val = self.string(name)?;
        match parse_duration(&val) {
            Ok(d) => Some(d),
            Err(error) => {
                tracing::warn!(key = name, %error, "invalid duration env var, ignoring");
                None
            }
        }
    }

    /// A duration in whole seconds within the accepted timeout range.
    fn timeout_secs(&self, name: &str) -> Option<u64> {
        let val = self.duration(name)?;
        let secs = val.as_secs();
        if val.subsec_nanos() != 0
            || !(1..=TransportSettings::MAX_TIMEOUT_SECS).contains(&secs)
        {
            tracing::warn!(
                key = name,
                value = ?val,
                max_secs = TransportSettings::MAX_TIMEOUT_SECS,
                "timeout env var must be whole seconds in range, ignoring"
            );
            return None;
        }
        Some(secs)
    }

    fn parsed<T: std::str::FromStr<Err = String>>(&self, name: &str) -> Option<T> {
        let val = self.string(name)?;
        match val.parse() {
            Ok(v) => Some(v),
            Err(error) => {
                tracing::warn!(key = name, %error, "invalid env var, ignoring");
                None
            }
        }
    }
}
