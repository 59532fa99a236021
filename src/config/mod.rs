//! Configuration management for mongoie
//!
//! This module handles loading configuration from:
//! - Configuration files (TOML format)
//! - Environment variables (`MONGOIE_` prefix)
//! - Command-line arguments (applied by the CLI layer)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::transfer::format::FileFormat;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Transfer defaults
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Default MongoDB connection URI
    #[serde(default = "default_uri")]
    pub default_uri: String,

    /// Connect and server selection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Defaults for export and import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Separator joining nested key paths
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Empty the target collection before importing
    #[serde(default = "default_true")]
    pub clear_before_import: bool,

    /// Rebuild nested documents from path keys on import
    #[serde(default)]
    pub denormalize_import: bool,

    /// Leave `_id` out of exported and imported records
    #[serde(default = "default_true")]
    pub exclude_id: bool,

    /// Format used when an export has no output path
    #[serde(default = "default_export_format")]
    pub default_format: String,

    /// Show a progress spinner
    #[serde(default = "default_true")]
    pub progress: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_true")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_app_name() -> String {
    "mongoie".to_string()
}

fn default_batch_size() -> usize {
    crate::transfer::pipeline::DEFAULT_BATCH_SIZE
}

fn default_separator() -> String {
    crate::transfer::flatten::DEFAULT_SEPARATOR.to_string()
}

fn default_export_format() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_uri: default_uri(),
            timeout: default_timeout(),
            app_name: default_app_name(),
        }
    }
}

impl ConnectionConfig {
    /// Connect and server selection timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            separator: default_separator(),
            clear_before_import: true,
            denormalize_import: false,
            exclude_id: true,
            default_format: default_export_format(),
            progress: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: true,
        }
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load the given file, or the default file when it exists
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Self::default_path();
                if default_path.is_file() {
                    debug!("Loading configuration from {}", default_path.display());
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply `MONGOIE_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment-style overrides from any lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("MONGOIE_URI") {
            self.connection.default_uri = uri;
        }
        if let Some(size) = lookup("MONGOIE_BATCH_SIZE") {
            self.transfer.batch_size = size.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "MONGOIE_BATCH_SIZE".to_string(),
                value: size.clone(),
            })?;
        }
        if let Some(separator) = lookup("MONGOIE_SEPARATOR") {
            self.transfer.separator = separator;
        }
        if let Some(level) = lookup("MONGOIE_LOG_LEVEL") {
            self.logging.level = LogLevel::parse(&level).ok_or_else(|| ConfigError::InvalidValue {
                field: "MONGOIE_LOG_LEVEL".to_string(),
                value: level.clone(),
            })?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongoie")
            .join("config.toml")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.transfer.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transfer.batch_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.transfer.separator.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "transfer.separator".to_string(),
                value: String::new(),
            }
            .into());
        }
        if self.connection.default_uri.trim().is_empty() {
            return Err(ConfigError::MissingField("connection.default_uri".to_string()).into());
        }
        FileFormat::from_token(&self.transfer.default_format).map_err(|_| {
            ConfigError::InvalidValue {
                field: "transfer.default_format".to_string(),
                value: self.transfer.default_format.clone(),
            }
        })?;
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }

    /// Parse a level name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MongoieError;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.default_uri, "mongodb://localhost:27017");
        assert_eq!(config.transfer.batch_size, 1000);
        assert_eq!(config.transfer.separator, ".");
        assert!(config.transfer.clear_before_import);
        assert!(!config.transfer.denormalize_import);
        assert!(config.transfer.exclude_id);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [transfer]
            batch_size = 250
            separator = "__"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.transfer.batch_size, 250);
        assert_eq!(config.transfer.separator, "__");
        assert!(config.transfer.exclude_id);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.connection.timeout, 30);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = Config::from_toml("[transfer\nbatch_size = ").unwrap_err();
        assert!(matches!(err, MongoieError::Config(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Config::load_from_file(Some(Path::new("/nonexistent/mongoie.toml"))).unwrap_err();
        assert!(matches!(err, MongoieError::Config(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.transfer.default_format = "csv".to_string();
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = Config::load_from_file(Some(&path)).unwrap();
        assert_eq!(loaded.transfer.default_format, "csv");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.transfer.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.transfer.separator = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.transfer.default_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MONGOIE_URI", "mongodb://db:27017"),
            ("MONGOIE_BATCH_SIZE", "50"),
            ("MONGOIE_SEPARATOR", "/"),
            ("MONGOIE_LOG_LEVEL", "INFO"),
        ]);
        let mut config = Config::default();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.connection.default_uri, "mongodb://db:27017");
        assert_eq!(config.transfer.batch_size, 50);
        assert_eq!(config.transfer.separator, "/");
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_bad_environment_value_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env_from(|key| {
            (key == "MONGOIE_BATCH_SIZE").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_connection_timeout() {
        assert_eq!(
            Config::default().connection.connect_timeout(),
            Duration::from_secs(30)
        );
    }
}
