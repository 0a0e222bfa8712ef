use std::{fs, path::Path, time::Duration};

use client_core::{clock::DEFAULT_SESSION_SECONDS, SessionConfig};
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "ecosystem.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub session_seconds: u32,
    pub telemetry_flush_secs: u64,
    pub clock_tick_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            session_seconds: DEFAULT_SESSION_SECONDS,
            telemetry_flush_secs: 30,
            clock_tick_ms: 1000,
        }
    }
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            session_seconds: self.session_seconds,
            clock_tick: Duration::from_millis(self.clock_tick_ms),
            telemetry_flush_interval: Duration::from_secs(self.telemetry_flush_secs),
        }
    }
}

pub fn load_settings(path: &Path) -> Settings {
    load_settings_with(path, |key| std::env::var(key).ok())
}

pub(crate) fn load_settings_with<F>(path: &Path, env: F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<toml::Table>(&raw) {
            Ok(file_cfg) => apply_file_overrides(&mut settings, &file_cfg),
            Err(err) => warn!("config: ignoring unparseable '{}': {err}", path.display()),
        }
    }

    if let Some(v) = env("ECOSYSTEM_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SESSION_SECONDS").and_then(|v| positive(&v)) {
        settings.session_seconds = v;
    }
    if let Some(v) = env("APP__TELEMETRY_FLUSH_SECS").and_then(|v| positive(&v)) {
        settings.telemetry_flush_secs = v;
    }
    if let Some(v) = env("APP__CLOCK_TICK_MS").and_then(|v| positive(&v)) {
        settings.clock_tick_ms = v;
    }

    settings
}

fn apply_file_overrides(settings: &mut Settings, file_cfg: &toml::Table) {
    if let Some(v) = file_cfg.get("server_url").and_then(toml::Value::as_str) {
        settings.server_url = v.to_string();
    }
    if let Some(v) = file_value(file_cfg, "session_seconds") {
        settings.session_seconds = v;
    }
    if let Some(v) = file_value(file_cfg, "telemetry_flush_secs") {
        settings.telemetry_flush_secs = v;
    }
    if let Some(v) = file_value(file_cfg, "clock_tick_ms") {
        settings.clock_tick_ms = v;
    }
}

/// Accepts either a TOML integer or a numeric string; zero is rejected.
fn file_value<T>(file_cfg: &toml::Table, key: &str) -> Option<T>
where
    T: TryFrom<i64> + std::str::FromStr + PartialEq + Default,
{
    let value = file_cfg.get(key)?;
    let parsed = match value {
        toml::Value::Integer(n) => T::try_from(*n).ok(),
        toml::Value::String(s) => s.trim().parse::<T>().ok(),
        _ => None,
    }
    .filter(|v| *v != T::default());
    if parsed.is_none() {
        warn!("config: ignoring invalid value for '{key}'");
    }
    parsed
}

fn positive<T>(raw: &str) -> Option<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    raw.trim().parse::<T>().ok().filter(|v| *v != T::default())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
