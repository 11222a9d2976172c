//! # Configuration Management Module
//!
//! All settings are load-time constants read from a TOML file; nothing is reconfigured
//! at runtime.
//!
//! ## Configuration Structure
//!
//! - [`DeviceConfig`] - how to reach the radio through the CLI
//! - [`FeedConfig`] - which pub/sub topics to ingest
//! - [`SyncConfig`] - sweep interval, history bound, flush cadence
//! - [`RetryConfig`] - bounded retry for CLI actions
//! - [`StorageConfig`] - state tree root and snapshot file
//! - [`ChatConfig`] - the fixed set of chat channels
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshbridge::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Radio: {:?}", config.device.target()?);
//!     Config::create_default("config.example.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [device]
//! host = "192.168.1.10"
//! cli_path = "/home/iobroker/.local/bin/meshtastic"
//!
//! [feed]
//! topic_pattern = "msh/*/2/json/*"
//!
//! [[chats]]
//! index = 0
//! name = "Default"
//! ```

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::fs;

use crate::meshtastic::DeviceTarget;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_chats")]
    pub chats: Vec<ChatConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Network address of the node (`--host`). Mutually exclusive with `port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Serial device of the node (`--port`). Mutually exclusive with `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Path to the `meshtastic` CLI.
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
    /// Per-invocation timeout in seconds.
    #[serde(default = "default_cli_timeout_secs")]
    pub cli_timeout_secs: u64,
    /// Text the node listing must contain to count as connected (case-insensitive).
    #[serde(default = "default_connected_marker")]
    pub connected_marker: String,
}

fn default_cli_path() -> String {
    "meshtastic".to_string()
}

fn default_cli_timeout_secs() -> u64 {
    60
}

fn default_connected_marker() -> String {
    "Connected".to_string()
}

impl DeviceConfig {
    pub fn target(&self) -> Result<DeviceTarget> {
        let host = self.host.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let port = self.port.as_deref().map(str::trim).filter(|s| !s.is_empty());
        match (host, port) {
            (Some(h), None) => Ok(DeviceTarget::Host(h.to_string())),
            (None, Some(p)) => Ok(DeviceTarget::Port(p.to_string())),
            (Some(_), Some(_)) => Err(anyhow!("[device] sets both host and port; pick one")),
            (None, None) => Err(anyhow!("[device] needs either host or port")),
        }
    }

    pub fn cli_timeout(&self) -> Duration {
        Duration::from_secs(self.cli_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Glob over feed topics; `*` matches any run of characters.
    pub topic_pattern: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            topic_pattern: "msh/*/2/json/*".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub poll_interval_secs: u64,
    /// Delay before the first sweep after startup.
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    /// Entries kept per chat history.
    pub history_max: usize,
    /// How often a changed state tree is written to disk.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

fn default_startup_delay_secs() -> u64 {
    2
}

fn default_flush_interval_secs() -> u64 {
    5
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            startup_delay_secs: default_startup_delay_secs(),
            history_max: 10,
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Re-attempts after the first failure before giving up.
    pub max_retries: u32,
    /// Fixed delay between attempts, seconds.
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            delay_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON snapshot of the state tree.
    pub state_file: String,
    /// Path prefix of every object the bridge owns; empty for none.
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: "data/state.json".to_string(),
            root: "Meshtastic".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    pub index: u32,
    pub name: String,
}

fn default_chats() -> Vec<ChatConfig> {
    vec![ChatConfig {
        index: 0,
        name: "Default".to_string(),
    }]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config = Self::from_toml(&content)
            .map_err(|e| anyhow!("Failed to load config file {}: {}", path, e))?;

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.device.target()?;
        if self.device.cli_path.trim().is_empty() {
            bail!("device.cli_path is empty");
        }
        if self.sync.poll_interval_secs == 0 {
            bail!("sync.poll_interval_secs must be > 0");
        }
        if self.sync.history_max == 0 {
            bail!("sync.history_max must be > 0");
        }
        let mut seen = HashSet::new();
        for chat in &self.chats {
            if !seen.insert(chat.index) {
                bail!("chat index {} configured twice", chat.index);
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: DeviceConfig {
                host: Some("192.168.1.10".to_string()),
                port: None,
                cli_path: default_cli_path(),
                cli_timeout_secs: default_cli_timeout_secs(),
                connected_marker: default_connected_marker(),
            },
            feed: FeedConfig::default(),
            sync: SyncConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            chats: default_chats(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("meshbridge.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.history_max, 10);
        assert_eq!(config.retry.max_retries, 10);
        assert_eq!(config.retry.delay(), Duration::from_secs(10));
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let serialized = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed = Config::from_toml(&serialized).unwrap();
        assert_eq!(parsed.chats, Config::default().chats);
        assert_eq!(parsed.storage.root, "Meshtastic");
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let cfg = Config::from_toml(
            r#"
[device]
port = "/dev/ttyUSB0"

[[chats]]
index = 0
name = "Default"

[[chats]]
index = 2
name = "Local"
"#,
        )
        .unwrap();
        assert_eq!(
            cfg.device.target().unwrap(),
            DeviceTarget::Port("/dev/ttyUSB0".into())
        );
        assert_eq!(cfg.feed.topic_pattern, "msh/*/2/json/*");
        let indexes: Vec<_> = cfg.chats.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 2]);
        assert_eq!(cfg.chats[1].name, "Local");
    }

    #[test]
    fn test_rejects_ambiguous_device() {
        let err = Config::from_toml(
            r#"
[device]
host = "10.0.0.1"
port = "/dev/ttyUSB0"
"#,
        );
        assert!(err.is_err());
        assert!(Config::from_toml("[device]\n").is_err());
    }

    #[test]
    fn test_rejects_duplicate_chat_index() {
        let err = Config::from_toml(
            r#"
[device]
host = "10.0.0.1"

[[chats]]
index = 1
name = "A"

[[chats]]
index = 1
name = "B"
"#,
        );
        assert!(err.is_err());
    }
}
