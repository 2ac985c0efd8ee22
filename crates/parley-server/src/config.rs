//! Server configuration.
//!
//! Configuration can be loaded from:
//! - A TOML file given with `--config`
//! - `parley.toml`, `/etc/parley/parley.toml` or `~/.config/parley/parley.toml`
//! - Environment variables (`PARLEY_HOST`) for defaults
//!
//! The listening port and the connection password always come from the
//! command line.

use crate::handlers::ServerError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on. Overridden by the command line.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name used as the source of server replies.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Event loop configuration.
    #[serde(default)]
    pub event_loop: EventLoopConfig,

    /// Channel configuration.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum bytes buffered for one unterminated inbound line.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Outbound queue capacity per connection, in lines. Raised to the
    /// greeting length if smaller.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Socket read buffer size in bytes.
    #[serde(default = "default_read_buffer")]
    pub read_buffer: usize,
}

/// Event loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLoopConfig {
    /// Interval at which the shutdown flag is polled, in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

/// Channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Delete channels when their last member leaves.
    #[serde(default)]
    pub auto_delete_empty: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    6667
}

fn default_server_name() -> String {
    "parley".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_line_length() -> usize {
    parley_protocol::DEFAULT_MAX_LINE_LENGTH
}

fn default_outbound_queue() -> usize {
    512
}

fn default_read_buffer() -> usize {
    4096
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: default_server_name(),
            limits: LimitsConfig::default(),
            event_loop: EventLoopConfig::default(),
            channels: ChannelsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_line_length: default_max_line_length(),
            outbound_queue: default_outbound_queue(),
            read_buffer: default_read_buffer(),
        }
    }
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, the default locations, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            return Self::from_file(expanded);
        }

        let config_paths = [
            "parley.toml",
            "/etc/parley/parley.toml",
            "~/.config/parley/parley.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip = self
            .host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_name, "parley");
        assert_eq!(config.limits.max_connections, 1024);
        assert_eq!(config.limits.max_line_length, 8192);
        assert_eq!(config.limits.outbound_queue, 512);
        assert_eq!(config.event_loop.tick_ms, 1000);
        assert!(!config.channels.auto_delete_empty);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 6697;
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 6697);
        assert!(addr.ip().is_loopback());

        config.host = "::1".to_string();
        assert!(config.bind_addr().unwrap().is_ipv6());
    }

    #[test]
    fn test_invalid_host() {
        let mut config = Config::default();
        config.host = "not a host".to_string();
        assert!(matches!(
            config.bind_addr(),
            Err(ServerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "127.0.0.1"
            server_name = "irc.example.net"

            [limits]
            max_connections = 64
            outbound_queue = 32

            [channels]
            auto_delete_empty = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.server_name, "irc.example.net");
        assert_eq!(config.limits.max_connections, 64);
        assert_eq!(config.limits.outbound_queue, 32);
        assert_eq!(config.limits.read_buffer, 4096);
        assert!(config.channels.auto_delete_empty);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_file("/definitely/not/here/parley.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
