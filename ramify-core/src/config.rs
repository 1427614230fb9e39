use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::feed::ChangeFeed;

/// Environment variable that overrides the configured store path.
pub const STORE_PATH_ENV: &str = "RAMIFY_STORE_PATH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
    /// Events buffered per change-feed subscriber before it reports lag.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            feed_capacity: default_feed_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SyncConfig {
    /// Fold notifications that queued up during a read into the next read.
    #[serde(default = "default_coalesce")]
    pub coalesce: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            coalesce: default_coalesce(),
        }
    }
}

fn default_feed_capacity() -> usize {
    ChangeFeed::DEFAULT_CAPACITY
}

fn default_coalesce() -> bool {
    true
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Like [`Config::load_from`], but a missing or unreadable file yields
    /// the defaults. Parse failures are logged.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Config::default();
        }
        match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                Config::default()
            }
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ramify").join("config.toml"))
}

/// Loads `<config_dir>/ramify/config.toml`, falling back to defaults when the
/// file is missing or invalid.
pub fn load_config() -> Config {
    match config_path() {
        Some(path) => Config::load_or_default(path),
        None => Config::default(),
    }
}

pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ramify")
        .join("store")
}

/// Picks the store path: explicit argument, then `RAMIFY_STORE_PATH`, then
/// the config file, then the platform data directory.
pub fn resolve_store_path(explicit: Option<PathBuf>, config: &StoreConfig) -> PathBuf {
    let from_env = std::env::var(STORE_PATH_ENV).ok();
    pick_store_path(explicit, from_env, config)
}

fn pick_store_path(explicit: Option<PathBuf>, from_env: Option<String>, config: &StoreConfig) -> PathBuf {
    explicit
        .or_else(|| from_env.filter(|s| !s.is_empty()).map(PathBuf::from))
        .or_else(|| config.path.clone())
        .unwrap_or_else(default_store_path)
}
