//! Configuration module for feedsift
//!
//! This module handles application configuration:
//! - Feed connection parameters ([`FeedConfig`]) supplied when establishing a connection
//! - Classifier scan window, bus sizing and connection timeouts
//! - Logging filter and optional log directory
//!
//! # File Location
//!
//! The configuration is a TOML file. When no path is given on the command
//! line the platform configuration directory is used:
//!
//! - **Linux**: `~/.config/dev.hxyulin.feedsift/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.feedsift/config.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.feedsift\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use feedsift::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default("feedsift.toml");
//! config.feed.topic_filter = "embeddings".to_string();
//! config.feed.validate()?;
//! config.save("feedsift.toml")?;
//! ```

use crate::error::{FeedError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.feedsift";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Topic filter sentinel meaning "every topic"
pub const ALL_TOPICS: &str = "ALL";

/// Default feed endpoint
pub const DEFAULT_ENDPOINT: &str = "tcp://localhost:5563";

/// Default receive timeout of the feed worker in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Default bus queue capacity.
/// 10,000 events is several seconds of a busy feed between consumer ticks.
pub const DEFAULT_BUS_CAPACITY: usize = 10_000;

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

// ==================== Feed ====================

/// Parameters of one live subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// `scheme://host:port`
    pub endpoint: String,
    /// Topic prefix to subscribe to; `"ALL"` is unfiltered
    pub topic_filter: String,
    /// Identity reported by this subscriber
    pub subscriber_id: String,
    /// Receive timeout per poll iteration
    pub poll_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            topic_filter: ALL_TOPICS.to_string(),
            subscriber_id: "feedsift".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl FeedConfig {
    /// Create a config for an endpoint with default topic and interval
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic_filter = topic.into();
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Subscription prefix handed to the socket; `"ALL"` maps to match-all
    pub fn subscription(&self) -> &str {
        if self.topic_filter == ALL_TOPICS {
            ""
        } else {
            &self.topic_filter
        }
    }

    /// Check the endpoint shape and poll interval
    pub fn validate(&self) -> Result<()> {
        let (scheme, rest) = self.endpoint.split_once("://").ok_or_else(|| {
            FeedError::Config(format!(
                "Endpoint '{}' is not of the form scheme://host:port",
                self.endpoint
            ))
        })?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FeedError::Config(format!(
                "Endpoint '{}' has an invalid scheme",
                self.endpoint
            )));
        }
        let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
            FeedError::Config(format!("Endpoint '{}' is missing a port", self.endpoint))
        })?;
        if host.is_empty() {
            return Err(FeedError::Config(format!(
                "Endpoint '{}' is missing a host",
                self.endpoint
            )));
        }
        if port.parse::<u16>().is_err() {
            return Err(FeedError::Config(format!(
                "Endpoint '{}' has an invalid port '{}'",
                self.endpoint, port
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(FeedError::Config(
                "Poll interval must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Classifier / Bus / Connection ====================

/// How much of a JSON payload the classifier looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Lines scanned from the top of the payload
    pub max_lines: usize,
    /// Characters kept from each scanned line
    pub max_chars_per_line: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_lines: 20,
            max_chars_per_line: 1024,
        }
    }
}

/// Event bus sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the queue between publishers and the consumer thread
    pub capacity: usize,
    /// Consumer loop tick in milliseconds
    pub tick_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUS_CAPACITY,
            tick_ms: 16,
        }
    }
}

impl BusConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Worker lifecycle timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// How long `establish` waits for the socket to become ready
    pub connect_timeout_ms: u64,
    /// How long `terminate` waits for the worker to join
    pub join_timeout_ms: u64,
    /// Pause after a receive error before polling again
    pub fault_backoff_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2000,
            join_timeout_ms: 1000,
            fault_backoff_ms: 50,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn fault_backoff(&self) -> Duration {
        Duration::from_millis(self.fault_backoff_ms)
    }
}

/// Logging setup used by the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Directory for a daily rolling log file
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,feedsift=debug".to_string(),
            log_dir: None,
        }
    }
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub classifier: ClassifierConfig,
    pub bus: BusConfig,
    pub connection: ConnectionConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FeedError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            FeedError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    FeedError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| FeedError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            FeedError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_feed_config() {
        let feed = FeedConfig::default();
        assert_eq!(feed.poll_interval_ms, 250);
        assert_eq!(feed.topic_filter, "ALL");
        assert_eq!(feed.subscription(), "");
        assert!(feed.validate().is_ok());
    }

    #[test]
    fn test_subscription_prefix() {
        let feed = FeedConfig::new("tcp://10.0.0.2:5563").with_topic("embeddings");
        assert_eq!(feed.subscription(), "embeddings");
    }

    #[test]
    fn test_validate_rejects_bad_endpoints() {
        for endpoint in [
            "localhost:5563",
            "://localhost:5563",
            "tcp://:5563",
            "tcp://localhost",
            "tcp://localhost:port",
            "tcp://localhost:70000",
        ] {
            let err = FeedConfig::new(endpoint).validate().unwrap_err();
            assert!(matches!(err, FeedError::Config(_)), "{}", endpoint);
        }
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let feed = FeedConfig::default().with_poll_interval_ms(0);
        assert!(feed.validate().is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let mut config = AppConfig::default();
        config.feed.topic_filter = "clusters".to_string();
        config.classifier.max_lines = 5;
        config.logging.log_dir = Some(PathBuf::from("/var/log/feedsift"));

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [feed]
            endpoint = "tcp://feeds.local:6000"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.feed.endpoint, "tcp://feeds.local:6000");
        assert_eq!(parsed.feed.poll_interval_ms, 250);
        assert_eq!(parsed.bus, BusConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.connection.join_timeout_ms = 300;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.connection.join_timeout_ms, 300);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default("/definitely/not/here/config.toml");
        assert_eq!(config, AppConfig::default());
    }
}
