// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker daemon configuration.

use qreply::descriptor::{DEFAULT_LOCK_DURATION, DEFAULT_MESSAGE_TTL};
use qreply::QueueDescriptor;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Broker daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 5680)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum frame size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Queues created at startup
    #[serde(default)]
    pub queues: Vec<QueueSpec>,

    /// Interval between statistics log lines in seconds (0 = off)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Queue to provision at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,

    #[serde(default)]
    pub requires_session: bool,

    #[serde(default = "default_ttl_secs")]
    pub message_time_to_live_secs: u64,

    #[serde(default = "default_lock_secs")]
    pub lock_duration_secs: u64,

    #[serde(default = "default_true")]
    pub enable_partitioning: bool,

    #[serde(default)]
    pub requires_duplicate_detection: bool,
}

impl QueueSpec {
    pub fn to_descriptor(&self) -> QueueDescriptor {
        QueueDescriptor::request(&self.name)
            .with_session(self.requires_session)
            .with_time_to_live(Duration::from_secs(self.message_time_to_live_secs))
            .with_lock_duration(Duration::from_secs(self.lock_duration_secs))
            .with_partitioning(self.enable_partitioning)
            .with_duplicate_detection(self.requires_duplicate_detection)
    }
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    5680
}

fn default_max_message_size() -> usize {
    qreply::broker::wire::DEFAULT_MAX_FRAME_SIZE
}

fn default_stats_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl_secs() -> u64 {
    DEFAULT_MESSAGE_TTL.as_secs()
}

fn default_lock_secs() -> u64 {
    DEFAULT_LOCK_DURATION.as_secs()
}

fn default_true() -> bool {
    true
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_message_size: default_max_message_size(),
            queues: Vec::new(),
            stats_interval_secs: default_stats_interval(),
            log_level: default_log_level(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Statistics log interval, `None` when disabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_message_size cannot be 0".into(),
            ));
        }
        for queue in &self.queues {
            if queue.name.is_empty() {
                return Err(ConfigError::InvalidValue("queue name cannot be empty".into()));
            }
            if queue.lock_duration_secs == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "queue {}: lock_duration_secs cannot be 0",
                    queue.name
                )));
            }
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.port, 5680);
        assert!(config.queues.is_empty());
        assert_eq!(config.stats_interval(), Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_queue_spec_defaults() {
        let config: BrokerConfig = serde_json::from_str(
            r#"{"port": 5690, "queues": [{"name": "thequeue"}, {"name": "theotherqueue", "requires_session": true}]}"#,
        )
        .unwrap();
        assert_eq!(config.port, 5690);

        let rq = config.queues[0].to_descriptor();
        assert_eq!(rq, QueueDescriptor::request("thequeue"));
        let rs = config.queues[1].to_descriptor();
        assert_eq!(rs, QueueDescriptor::response("theotherqueue"));
    }

    #[test]
    fn test_validation() {
        let config = BrokerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BrokerConfig {
            max_message_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BrokerConfig {
            stats_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.stats_interval(), None);
    }
}
