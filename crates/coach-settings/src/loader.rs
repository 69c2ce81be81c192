//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CoachSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{CoachSettings, HttpMailSettings, PostRecommendationMode, SmtpSettings};

/// Resolve the default settings file (`~/.coach/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".coach").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CoachSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, defaults are used. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CoachSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<CoachSettings> {
    let defaults = serde_json::to_value(CoachSettings::default())?;

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

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut CoachSettings) {
    apply_env_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (tests pass a map).
///
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_env_overrides_from<F>(settings: &mut CoachSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.u16("PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.string("CORS_ORIGINS") {
        settings.server.allowed_origins = split_list(&v);
    }

    // ── Completion provider ─────────────────────────────────────────
    if let Some(v) = env.string("OPENAI_API_KEY") {
        settings.llm.api_key = Some(v);
    }
    if let Some(v) = env.string("OPENAI_BASE_URL") {
        settings.llm.base_url = v;
    }
    if let Some(v) = env.string("OPENAI_MODEL") {
        settings.llm.model = v;
    }
    if let Some(v) = env.u64("COACH_LLM_TIMEOUT_SECS", 1, 600) {
        settings.llm.timeout_secs = v;
    }

    // ── Mail ────────────────────────────────────────────────────────
    if let Some(v) = env.string("TO_EMAIL") {
        settings.mail.staff_address = Some(v);
    }
    if let Some(v) = env.string("MAIL_FROM_NAME") {
        settings.mail.from_name = Some(v);
    }
    let smtp_host = env.string("SMTP_HOST");
    if smtp_host.is_some() || settings.mail.smtp.is_some() {
        let smtp = settings.mail.smtp.get_or_insert_with(SmtpSettings::default);
        if let Some(v) = smtp_host {
            smtp.host = v;
        }
        if let Some(v) = env.u16("SMTP_PORT", 1, 65535) {
            smtp.port = v;
        }
        if let Some(v) = env.string("SMTP_USER") {
            smtp.user = v;
        }
        if let Some(v) = env.string("SMTP_PASS") {
            smtp.pass = v;
        }
    }
    let mail_api = env.string("MAIL_API_URL");
    if mail_api.is_some() || settings.mail.http.is_some() {
        let http = settings.mail.http.get_or_insert_with(HttpMailSettings::default);
        if let Some(v) = mail_api {
            http.endpoint = v;
        }
        if let Some(v) = env.string("MAIL_API_KEY") {
            http.api_key = v;
        }
        if let Some(v) = env.string("MAIL_FROM") {
            http.from = v;
        }
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = env.usize("COACH_MAX_HISTORY", 2, 1000) {
        settings.session.max_history = v;
    }
    if let Some(v) = env.u64("COACH_INACTIVITY_SECS", 1, 7 * 24 * 3600) {
        settings.session.inactivity_secs = v;
    }
    if let Some(v) = env.bool("COACH_FORGET_AFTER_SUMMARY") {
        settings.session.forget_after_summary = v;
    }
    if let Some(v) = env.string("COACH_POST_RECOMMENDATION") {
        match serde_json::from_value::<PostRecommendationMode>(Value::String(v.to_lowercase())) {
            Ok(mode) => settings.session.post_recommendation = mode,
            Err(_) => tracing::warn!(key = "COACH_POST_RECOMMENDATION", value = %v, "invalid mode, ignoring"),
        }
    }

    // ── Telemetry ───────────────────────────────────────────────────
    if let Some(v) = env.string("COACH_LOG_LEVEL") {
        settings.telemetry.level = v;
    }
    if let Some(v) = env.bool("COACH_LOG_JSON") {
        settings.telemetry.json = v;
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
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

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
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

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}
