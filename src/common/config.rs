use config::ConfigError as ConfigLibError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config file: {0}")]
    ParseError(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Config library error: {0}")]
    ConfigLibError(#[from] ConfigLibError),
    #[error("Failed to render config: {0}")]
    RenderError(#[from] toml::ser::Error),
}

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Per-connection read buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Connections served concurrently before new ones are dropped
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Timeout for each outbound connect attempt, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Log configuration
    #[serde(default)]
    pub log: LoggerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggerConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path; empty disables file logging
    #[serde(default = "default_log_path")]
    pub path: String,
    /// Log file archive pattern
    #[serde(default = "default_archive_pattern")]
    pub archive_pattern: String,
    /// Number of log files to keep
    #[serde(default = "default_file_count")]
    pub file_count: u32,
    /// Size of each log file (MB)
    #[serde(default = "default_file_size")]
    pub file_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            buffer_size: default_buffer_size(),
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
            log: LoggerConfig::default(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            path: default_log_path(),
            archive_pattern: default_archive_pattern(),
            file_count: default_file_count(),
            file_size: default_file_size(),
        }
    }
}

fn default_listen_address() -> String {
    "127.0.0.1:1080".to_string()
}

fn default_buffer_size() -> usize {
    4096
}

fn default_max_connections() -> usize {
    1024
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "Info".to_string()
}

fn default_log_path() -> String {
    "logs/socks5-relay.log".to_string()
}

fn default_archive_pattern() -> String {
    "logs/archive/socks5-relay-{}.log".to_string()
}

fn default_file_count() -> u32 {
    5
}

fn default_file_size() -> u64 {
    10
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, in the same shape `from_file` reads
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid listen address format: '{}'",
                self.listen_address
            )));
        }

        if self.buffer_size == 0 || self.buffer_size > 65536 {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid buffer size: {}. Must be between 1 and 65536",
                self.buffer_size
            )));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout == 0 {
            return Err(ConfigError::InvalidConfig(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_address, "127.0.0.1:1080");
        assert_eq!(config.connect_timeout, 10);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.listen_address = "localhost".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));

        let mut config = Config::default();
        config.buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connect_timeout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let path = std::env::temp_dir().join(format!(
            "socks5-relay-config-{}.toml",
            std::process::id()
        ));
        fs::write(
            &path,
            "listen_address = \"0.0.0.0:9050\"\nconnect_timeout = 3\n\n[log]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.listen_address, "0.0.0.0:9050");
        assert_eq!(config.connect_timeout, 3);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.file_count, 5);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.max_connections = 64;

        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
