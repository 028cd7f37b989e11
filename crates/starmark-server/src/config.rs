//! Server configuration.

use anyhow::Result;
use serde::Deserialize;
use starmark_core::FavoritesConfig;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Directory holding one JSONL file per chat. Chats live in memory only when unset.
    #[serde(default = "default_chats_dir")]
    pub chats_dir: Option<PathBuf>,
    #[serde(default)]
    pub favorites: FavoritesConfig,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("starmark")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./frontend/dist")
}

fn default_db_path() -> PathBuf {
    data_dir().join("settings.db")
}

fn default_chats_dir() -> Option<PathBuf> {
    Some(data_dir().join("chats"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            db_path: default_db_path(),
            chats_dir: default_chats_dir(),
            favorites: FavoritesConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }
}
