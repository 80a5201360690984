use config::ConfigError as ConfigLibError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Config library error: {0}")]
    ConfigLibError(#[from] ConfigLibError),
}

/// Upstream proxy target: when set, every request (including CONNECT) is
/// routed through this proxy instead of dialing the origin directly.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpstreamConfig {
    pub name: String,
    pub port: u16,
}

/// Opaque-tunnel redirect target: when set,
/// the proxy skips HTTP parsing entirely and relays straight to this host.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TunnelConfig {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AclConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AnonymousConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
}

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Idle-timeout applied to the relay loop, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idletimeout: u64,
    /// Per-direction relay buffer capacity (MAXBUFFSIZE).
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Maximum number of concurrently served connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Outbound dial timeout, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Optional upstream proxy; when set, the proxy never dials origins directly.
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    /// Optional opaque-tunnel redirect target.
    #[serde(default)]
    pub tunnel: Option<TunnelConfig>,
    /// Sentinel hostname answered with the stats page instead of forwarded.
    #[serde(default)]
    pub stathost: Option<String>,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub acl: AclConfig,
    #[serde(default)]
    pub anonymous: AnonymousConfig,
    /// Enables the `X-Tinyproxy` client-IP header when set.
    #[serde(default)]
    pub my_domain: Option<String>,
    /// Log configuration
    #[serde(default)]
    pub log: LoggerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggerConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path
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

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            idletimeout: default_idle_timeout(),
            buffer_size: default_buffer_size(),
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
            upstream: None,
            tunnel: None,
            stathost: None,
            filter: FilterConfig::default(),
            acl: AclConfig::default(),
            anonymous: AnonymousConfig::default(),
            my_domain: None,
            log: LoggerConfig::default(),
        }
    }
}

/// Default listen address
fn default_listen_address() -> String {
    "127.0.0.1:8888".to_string()
}

/// Default idle timeout, seconds
fn default_idle_timeout() -> u64 {
    120
}

/// Default buffer size (MAXBUFFSIZE)
fn default_buffer_size() -> usize {
    8192
}

/// Default max connections
fn default_max_connections() -> usize {
    512
}

/// Default outbound connect timeout, seconds
fn default_connect_timeout() -> u64 {
    10
}

/// Default log level
fn default_log_level() -> String {
    "Info".to_string()
}

/// Default log path
fn default_log_path() -> String {
    "logs/tinyproxy-rs.log".to_string()
}

/// Default archive pattern
fn default_archive_pattern() -> String {
    "logs/archive/tinyproxy-rs-{}.log".to_string()
}

/// Default file count
fn default_file_count() -> u32 {
    5
}

/// Default file size in MB
fn default_file_size() -> u64 {
    10
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(ConfigError::ConfigLibError)?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate if configuration is valid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_address.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Listen address cannot be empty".to_string(),
            ));
        }

        if self.listen_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid listen address format: {}",
                self.listen_address
            )));
        }

        if self.buffer_size < 512 || self.buffer_size > 1 << 20 {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid buffer size: {}. Must be between 512 and 1048576",
                self.buffer_size
            )));
        }

        if self.idletimeout == 0 {
            return Err(ConfigError::InvalidConfig(
                "idletimeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// `HTTP_LINE_LENGTH = MAXBUFFSIZE / 6`.
    pub fn max_line_length(&self) -> usize {
        self.buffer_size / 6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_listen_address() {
        let mut config = Config::default();
        config.listen_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_undersized_buffer() {
        let mut config = Config::default();
        config.buffer_size = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_line_length_is_a_sixth_of_buffer_size() {
        let mut config = Config::default();
        config.buffer_size = 8192;
        config.validate().unwrap();
        assert_eq!(config.max_line_length(), 1365);
    }
}
