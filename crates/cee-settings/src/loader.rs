//! Settings loading: file layer, deep merge, and `CEE_*` environment overrides.
//!
//! Objects merge recursively, arrays and primitives are replaced, and `null`
//! in the user file leaves the default in place.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{AuditBackend, CeeSettings};

/// Environment variable naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "CEE_SETTINGS";

/// Directory holding user state (`~/.cee`).
pub fn cee_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cee")
}

/// Resolve the settings file: `$CEE_SETTINGS` if set, else `~/.cee/settings.json`.
pub fn settings_path() -> PathBuf {
    match std::env::var(SETTINGS_PATH_ENV) {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => cee_home().join("settings.json"),
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CeeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CeeSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<CeeSettings> {
    let defaults = serde_json::to_value(CeeSettings::default())?;

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

/// Apply `CEE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut CeeSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning, leaving the file/default value in place.
pub fn apply_overrides_from(settings: &mut CeeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CEE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("CEE_PORT", 1, 65535) {
        settings.server.port = v;
    }

    // ── Orchestrator ────────────────────────────────────────────────
    if let Some(v) = env.u64("CEE_SYNC_TIMEOUT_MS", 100, 3_600_000) {
        settings.orchestrator.sync_timeout_ms = v;
    }
    if let Some(v) = env.u64("CEE_ASYNC_TIMEOUT_MS", 100, 86_400_000) {
        settings.orchestrator.async_timeout_ms = v;
    }
    if let Some(v) = env.usize("CEE_MAX_CONCURRENT_JOBS", 1, 100_000) {
        settings.orchestrator.max_concurrent_jobs = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("CEE_JWT_SECRET") {
        settings.auth.jwt_secret = Some(v);
    }

    // ── Audit ───────────────────────────────────────────────────────
    if let Some(v) = env.string("CEE_AUDIT_BACKEND") {
        match serde_json::from_value::<AuditBackend>(Value::String(v.to_lowercase())) {
            Ok(backend) => settings.audit.backend = backend,
            Err(_) => tracing::warn!(key = "CEE_AUDIT_BACKEND", value = %v, "unknown audit backend, ignoring"),
        }
    }
    if let Some(v) = env.string("CEE_AUDIT_DB") {
        settings.audit.sqlite_path = v;
    }

    // ── Collaborators ───────────────────────────────────────────────
    if let Some(v) = env.string("CEE_QDRANT_URL").or_else(|| env.string("QDRANT_URL")) {
        settings.collaborators.qdrant_url = v;
    }
    if let Some(v) = env.string("CEE_QDRANT_COLLECTION") {
        settings.collaborators.qdrant_collection = v;
    }
    if let Some(v) = env.string("CEE_QDRANT_API_KEY") {
        settings.collaborators.qdrant_api_key = Some(v);
    }
    if let Some(v) = env.usize("CEE_EMBEDDING_DIMS", 1, 65_536) {
        settings.collaborators.embedding_dimensions = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CEE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("CEE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(val.trim());
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}
