//! Configuration management for resfetch

pub mod schema;

pub use schema::Config;

use crate::error::{ResfetchError, ResfetchResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resfetch")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resfetch")
    }

    /// Metadata store file for `config`
    pub fn store_path(config: &Config) -> PathBuf {
        config
            .store
            .path
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("caches.json"))
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> ResfetchResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> ResfetchResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ResfetchError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| ResfetchError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Ensure the state directory exists
    pub async fn ensure_state_dir() -> ResfetchResult<PathBuf> {
        let dir = Self::state_dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ResfetchError::io(format!("creating directory {}", dir.display()), e))?;
        Ok(dir)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
