use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use storyloom_core::RetryPolicy;

const DEFAULT_SERVER_URL: &str = "ws://localhost:8080";
const DEFAULT_ORCHESTRATOR_URL: &str = "http://localhost:3000";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Viewer configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Sync server pushing game snapshots (e.g. "ws://localhost:8080")
    pub server_url: ConfigValue<String>,
    /// Orchestrator receiving game commands
    pub orchestrator_url: ConfigValue<String>,
    /// Retry policy for commands sent to the orchestrator
    pub retry: ConfigValue<RetryPolicy>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server_url: Option<String>,
    orchestrator_url: Option<String>,
    retry: Option<RetryPolicy>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut server_url =
            ConfigValue::new(DEFAULT_SERVER_URL.to_string(), ConfigSource::Default);
        let mut orchestrator_url =
            ConfigValue::new(DEFAULT_ORCHESTRATOR_URL.to_string(), ConfigSource::Default);
        let mut retry = ConfigValue::new(RetryPolicy::default(), ConfigSource::Default);
        let mut config_file = None;

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.server_url {
                server_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(url) = file_config.orchestrator_url {
                orchestrator_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(policy) = file_config.retry {
                retry = ConfigValue::new(policy, ConfigSource::File);
            }
        }

        // Apply environment variable overrides
        if let Ok(url) = std::env::var("LOOM_SERVER_URL") {
            server_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("LOOM_ORCHESTRATOR_URL") {
            orchestrator_url = ConfigValue::new(url, ConfigSource::Environment);
        }

        Ok(Self {
            server_url,
            orchestrator_url,
            retry,
            config_file,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/loom/
    /// - macOS: ~/Library/Application Support/loom/
    /// - Windows: %APPDATA%/loom/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loom")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.orchestrator_url.source, ConfigSource::Default);
        assert_eq!(config.retry.value, RetryPolicy::default());
        assert_eq!(config.retry.source, ConfigSource::Default);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "orchestrator_url: http://orchestrator:9000").unwrap();
        writeln!(file, "retry:").unwrap();
        writeln!(file, "  max_retries: 1").unwrap();
        writeln!(file, "  base_delay_ms: 100").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.orchestrator_url.value, "http://orchestrator:9000");
        assert_eq!(config.orchestrator_url.source, ConfigSource::File);
        assert_eq!(config.retry.value.max_retries, 1);
        assert_eq!(config.retry.value.base_delay, Duration::from_millis(100));
        assert_eq!(config.retry.source, ConfigSource::File);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "server_url: ws://fromfile:8080").unwrap();

        std::env::set_var("LOOM_SERVER_URL", "ws://fromenv:8080");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.server_url.value, "ws://fromenv:8080");
        assert_eq!(config.server_url.source, ConfigSource::Environment);

        std::env::remove_var("LOOM_SERVER_URL");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let err = Config::load(Some(config_path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
