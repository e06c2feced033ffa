//! Configuration module for hoard.

use serde::Deserialize;
use std::path::Path;

use crate::{HoardError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/hoard.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Physical storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory every storage tree lives under.
    #[serde(default = "default_root_path")]
    pub root_path: String,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Read buffer size used when archiving file contents, in kilobytes.
    #[serde(default = "default_archive_chunk_size")]
    pub archive_chunk_kb: usize,
}

fn default_root_path() -> String {
    "data/storages".to_string()
}

fn default_max_upload_size() -> u64 {
    1024
}

fn default_archive_chunk_size() -> usize {
    64
}

impl StorageConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }

    /// Archive read buffer size in bytes.
    pub fn archive_chunk_bytes(&self) -> usize {
        self.archive_chunk_kb * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            max_upload_size_mb: default_max_upload_size(),
            archive_chunk_kb: default_archive_chunk_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Extra filter directives, e.g. `"hoard::file=debug"`.
    #[serde(default)]
    pub directives: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/hoard.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
            directives: Vec::new(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Physical storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| HoardError::Config(e.to_string()))
    }

    /// Apply overrides from environment variables.
    ///
    /// Supported variables: `HOARD_DATABASE_PATH`, `HOARD_STORAGE_ROOT`,
    /// `HOARD_LOG_LEVEL`. Empty values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = non_empty_env("HOARD_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(root) = non_empty_env("HOARD_STORAGE_ROOT") {
            self.storage.root_path = root;
        }
        if let Some(level) = non_empty_env("HOARD_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root_path.trim().is_empty() {
            return Err(HoardError::Config(
                "storage.root_path must not be empty".to_string(),
            ));
        }
        if self.storage.max_upload_size_mb == 0 {
            return Err(HoardError::Config(
                "storage.max_upload_size_mb must be greater than 0".to_string(),
            ));
        }
        if self.storage.archive_chunk_kb == 0 {
            return Err(HoardError::Config(
                "storage.archive_chunk_kb must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
