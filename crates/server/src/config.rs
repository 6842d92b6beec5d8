use std::{collections::HashMap, fs, path::PathBuf};

use storage::StoreConfig;
use tracing::warn;

const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    /// When absent the status is kept in `status_file` only.
    pub database_url: Option<String>,
    pub status_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            database_url: None,
            status_file: PathBuf::from("./data/parking_data.json"),
        }
    }
}

impl Settings {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url.as_deref().and_then(normalize_database_url),
            status_file: self.status_file.clone(),
        }
    }
}

pub fn load_settings() -> Settings {
    let file_cfg = match fs::read_to_string(SETTINGS_FILE) {
        Ok(raw) => match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(values) => values,
            Err(error) => {
                warn!(%error, file = SETTINGS_FILE, "ignoring unreadable settings file");
                HashMap::new()
            }
        },
        Err(_) => HashMap::new(),
    };

    resolve_settings(&file_cfg, |key| std::env::var(key).ok())
}

/// Layers `server.toml` values and then environment variables over the defaults.
pub(crate) fn resolve_settings(
    file_cfg: &HashMap<String, String>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("status_file") {
        settings.status_file = PathBuf::from(v);
    }

    if let Some(port) = env("PORT").filter(|p| p.parse::<u16>().is_ok()) {
        settings.server_bind = format!("0.0.0.0:{port}");
    }
    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = Some(v);
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = Some(v);
    }

    if let Some(v) = env("STATUS_FILE") {
        settings.status_file = PathBuf::from(v);
    }
    if let Some(v) = env("APP__STATUS_FILE") {
        settings.status_file = PathBuf::from(v);
    }

    settings
}

/// Normalises a configured database location into a sqlite url.
///
/// Blank values count as "not configured".
pub(crate) fn normalize_database_url(raw_database_url: &str) -> Option<String> {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return None;
    }

    if raw_database_url.starts_with("sqlite::memory:") {
        return Some(raw_database_url.to_string());
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        if is_windows_drive_path(path) {
            return Some(format!("sqlite:{}", path.replace('\\', "/")));
        }
        return Some(raw_database_url.to_string());
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return Some(sqlite_url_for_path(path));
    }

    if raw_database_url.contains("://") {
        return Some(raw_database_url.to_string());
    }

    Some(sqlite_url_for_path(raw_database_url))
}

fn sqlite_url_for_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    if is_windows_drive_path(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn is_windows_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
