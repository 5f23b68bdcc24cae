use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::platform;

/// Application-level configuration, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub theme: String,
}

pub fn config_path() -> PathBuf {
    platform::config_dir().join("config.json")
}

/// Read the app config.  A missing or unreadable file yields the default;
/// config is never a reason to refuse to start.
pub fn load_config() -> AppConfig {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> AppConfig {
    let Ok(data) = std::fs::read(path) else {
        return AppConfig::default();
    };
    serde_json::from_slice(&data).unwrap_or_default()
}

/// Persist the theme slug, preserving any fields this version doesn't know.
pub fn save_theme(slug: &str) -> anyhow::Result<()> {
    save_theme_to(&config_path(), slug)
}

pub fn save_theme_to(path: &Path, slug: &str) -> anyhow::Result<()> {
    let mut raw: serde_json::Map<String, serde_json::Value> = match std::fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_default(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::Map::new(),
        Err(e) => return Err(e.into()),
    };

    raw.insert("theme".into(), serde_json::Value::String(slug.to_string()));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let out = serde_json::to_vec_pretty(&serde_json::Value::Object(raw))?;
    std::fs::write(path, out)?;
    Ok(())
}
