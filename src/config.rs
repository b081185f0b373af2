use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::feed::{WatchConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_RESUME_ATTEMPTS};

/// Sync server configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Path to the SQLite database holding games and their change log
    pub database_path: PathBuf,
    /// How often the change feed polls when nothing wakes it
    pub poll_interval_ms: u64,
    /// Changes read per poll
    pub batch_size: u32,
    /// Consecutive reopen attempts before the change feed gives up
    pub max_resume_attempts: u32,
    /// Pause between reopen attempts
    pub resume_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("storyloom")
                .join("storyloom.db"),
            poll_interval_ms: 200,
            batch_size: DEFAULT_BATCH_SIZE,
            max_resume_attempts: DEFAULT_MAX_RESUME_ATTEMPTS,
            resume_backoff_ms: 250,
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var("STORYLOOM_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        if let Ok(port) = std::env::var("STORYLOOM_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("STORYLOOM_PORT", port))?;
        }
        if let Ok(db_path) = std::env::var("STORYLOOM_DATABASE_PATH") {
            config.database_path = PathBuf::from(db_path);
        }
        if let Ok(interval) = std::env::var("STORYLOOM_POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval
                .parse()
                .map_err(|_| ConfigError::InvalidValue("STORYLOOM_POLL_INTERVAL_MS", interval))?;
        }

        Ok(config)
    }

    /// Default config file path: <config dir>/storyloom/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("storyloom")
            .join("config.yaml")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            max_resume_attempts: self.max_resume_attempts,
            resume_backoff: Duration::from_millis(self.resume_backoff_ms),
            ..WatchConfig::default()
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
            ConfigError::InvalidValue(var, value) => {
                write!(f, "Invalid value for {}: '{}'", var, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
