use std::{fs, path::Path};

use serde::Deserialize;
use shared::protocol::USERS_COLLECTION;
use tracing::warn;

pub const SETTINGS_FILE: &str = "client.toml";
pub const DEFAULT_BACKEND_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend_url: Option<String>,
    pub current_host: Option<String>,
    pub realtime_url: Option<String>,
    pub realtime_auth: Option<String>,
    pub realtime_collection: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: None,
            current_host: None,
            realtime_url: None,
            realtime_auth: None,
            realtime_collection: USERS_COLLECTION.into(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn backend_base_url(&self) -> String {
        resolve_backend_url(self.backend_url.as_deref(), self.current_host.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backend_url: Option<String>,
    current_host: Option<String>,
    realtime_url: Option<String>,
    realtime_auth: Option<String>,
    realtime_collection: Option<String>,
    log_filter: Option<String>,
}

pub fn load_settings() -> Settings {
    let raw = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(raw.as_deref(), |key| std::env::var(key).ok())
}

pub fn load_settings_file(path: &Path) -> Settings {
    let raw = fs::read_to_string(path).ok();
    if raw.is_none() {
        warn!(path = %path.display(), "settings file not readable; using defaults");
    }
    load_settings_from(raw.as_deref(), |key| std::env::var(key).ok())
}

/// Layers defaults, the optional TOML file contents and environment lookups.
/// Later layers win; blank values never override.
pub fn load_settings_from(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file_contents {
        match toml::from_str::<FileSettings>(raw) {
            Ok(file_cfg) => {
                if let Some(v) = non_blank(file_cfg.backend_url) {
                    settings.backend_url = Some(v);
                }
                if let Some(v) = non_blank(file_cfg.current_host) {
                    settings.current_host = Some(v);
                }
                if let Some(v) = non_blank(file_cfg.realtime_url) {
                    settings.realtime_url = Some(v);
                }
                if let Some(v) = non_blank(file_cfg.realtime_auth) {
                    settings.realtime_auth = Some(v);
                }
                if let Some(v) = non_blank(file_cfg.realtime_collection) {
                    settings.realtime_collection = v;
                }
                if let Some(v) = non_blank(file_cfg.log_filter) {
                    settings.log_filter = v;
                }
            }
            Err(err) => warn!(%err, file = SETTINGS_FILE, "ignoring malformed settings file"),
        }
    }

    let env = |key: &str| non_blank(env(key));

    if let Some(v) = env("BACKEND_URL") {
        settings.backend_url = Some(v);
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = Some(v);
    }

    if settings.current_host.is_none() {
        settings.current_host = env("HOSTNAME");
    }
    if let Some(v) = env("APP__CURRENT_HOST") {
        settings.current_host = Some(v);
    }

    if let Some(v) = env("REALTIME_URL") {
        settings.realtime_url = Some(v);
    }
    if let Some(v) = env("APP__REALTIME_URL") {
        settings.realtime_url = Some(v);
    }

    if let Some(v) = env("APP__REALTIME_AUTH") {
        settings.realtime_auth = Some(v);
    }
    if let Some(v) = env("APP__REALTIME_COLLECTION") {
        settings.realtime_collection = v;
    }
    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings
}

/// Resolves the REST backend base URL: explicit override first (gaining an
/// `http://` scheme when it has none), then `http://<current-host>:3000`,
/// otherwise an empty string.
pub fn resolve_backend_url(override_url: Option<&str>, current_host: Option<&str>) -> String {
    if let Some(raw) = override_url.map(str::trim).filter(|v| !v.is_empty()) {
        let url = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        return url.trim_end_matches('/').to_string();
    }

    if let Some(host) = current_host.map(str::trim).filter(|v| !v.is_empty()) {
        return format!("http://{host}:{DEFAULT_BACKEND_PORT}");
    }

    warn!("no backend address configured; REST calls will fail");
    String::new()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
