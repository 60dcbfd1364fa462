// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Factory configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration.

use crate::descriptor::{DriftPolicy, QueueDescriptor};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Broker target, queue names and queue attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// `memory://` or `tcp://host:port`.
    #[serde(default = "default_connection_string")]
    pub connection_string: String,

    /// Queue the requests are sent to.
    #[serde(default = "default_request_queue")]
    pub request_queue: String,

    /// Session-enabled queue the replies come back on.
    #[serde(default = "default_response_queue")]
    pub response_queue: String,

    /// How long a sender waits for its reply (milliseconds).
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    /// When a live queue counts as drifted.
    #[serde(default)]
    pub drift_policy: DriftPolicy,

    #[serde(default = "default_message_ttl_secs")]
    pub message_time_to_live_secs: u64,

    #[serde(default = "default_lock_duration_secs")]
    pub lock_duration_secs: u64,

    #[serde(default = "default_true")]
    pub enable_partitioning: bool,

    #[serde(default)]
    pub requires_duplicate_detection: bool,
}

fn default_connection_string() -> String {
    "memory://".to_string()
}

fn default_request_queue() -> String {
    "thequeue".to_string()
}

fn default_response_queue() -> String {
    "theotherqueue".to_string()
}

fn default_reply_timeout_ms() -> u64 {
    20_000
}

fn default_message_ttl_secs() -> u64 {
    crate::descriptor::DEFAULT_MESSAGE_TTL.as_secs()
}

fn default_lock_duration_secs() -> u64 {
    crate::descriptor::DEFAULT_LOCK_DURATION.as_secs()
}

fn default_true() -> bool {
    true
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            connection_string: default_connection_string(),
            request_queue: default_request_queue(),
            response_queue: default_response_queue(),
            reply_timeout_ms: default_reply_timeout_ms(),
            drift_policy: DriftPolicy::default(),
            message_time_to_live_secs: default_message_ttl_secs(),
            lock_duration_secs: default_lock_duration_secs(),
            enable_partitioning: true,
            requires_duplicate_detection: false,
        }
    }
}

impl FactoryConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration targeting `connection_string` with default queues.
    pub fn with_connection(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_string.trim().is_empty() {
            return Err(ConfigError::Invalid("connection_string is empty".into()));
        }
        if self.request_queue.is_empty() {
            return Err(ConfigError::Invalid("request_queue is empty".into()));
        }
        if self.response_queue.is_empty() {
            return Err(ConfigError::Invalid("response_queue is empty".into()));
        }
        if self.request_queue == self.response_queue {
            return Err(ConfigError::Invalid(format!(
                "request and response queue are both '{}'",
                self.request_queue
            )));
        }
        if self.reply_timeout_ms == 0 {
            return Err(ConfigError::Invalid("reply_timeout_ms must be > 0".into()));
        }
        if self.lock_duration_secs == 0 {
            return Err(ConfigError::Invalid("lock_duration_secs must be > 0".into()));
        }
        if self.message_time_to_live_secs == 0 {
            return Err(ConfigError::Invalid(
                "message_time_to_live_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    fn apply_attributes(&self, descriptor: QueueDescriptor) -> QueueDescriptor {
        descriptor
            .with_time_to_live(Duration::from_secs(self.message_time_to_live_secs))
            .with_lock_duration(Duration::from_secs(self.lock_duration_secs))
            .with_partitioning(self.enable_partitioning)
            .with_duplicate_detection(self.requires_duplicate_detection)
    }

    /// Target descriptor for the request queue.
    pub fn request_descriptor(&self) -> QueueDescriptor {
        self.apply_attributes(QueueDescriptor::request(&self.request_queue))
    }

    /// Target descriptor for the response queue.
    pub fn response_descriptor(&self) -> QueueDescriptor {
        self.apply_attributes(QueueDescriptor::response(&self.response_queue))
    }

    /// Commented sample file with every default spelled out.
    pub fn sample_toml() -> String {
        let d = Self::default();
        format!(
            r#"# qreply factory configuration

# memory:// runs an in-process broker, tcp://host:port targets qreply-broker
connection_string = "{}"

request_queue = "{}"
response_queue = "{}"

# how long a sender waits for its reply
reply_timeout_ms = {}

# "strict" also recreates queues whose lock duration or TTL is too short,
# "session-only" only looks at the session flag
drift_policy = "strict"

message_time_to_live_secs = {}
lock_duration_secs = {}
enable_partitioning = {}
requires_duplicate_detection = {}
"#,
            d.connection_string,
            d.request_queue,
            d.response_queue,
            d.reply_timeout_ms,
            d.message_time_to_live_secs,
            d.lock_duration_secs,
            d.enable_partitioning,
            d.requires_duplicate_detection,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FactoryConfig::default();
        config.validate().unwrap();
        assert_eq!(config.request_queue, "thequeue");
        assert_eq!(config.response_queue, "theotherqueue");
        assert_eq!(config.reply_timeout(), Duration::from_secs(20));
        assert_eq!(config.drift_policy, DriftPolicy::Strict);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = FactoryConfig::from_toml_str("").unwrap();
        assert_eq!(config, FactoryConfig::default());
    }

    #[test]
    fn sample_parses_back_to_defaults() {
        let config = FactoryConfig::from_toml_str(&FactoryConfig::sample_toml()).unwrap();
        assert_eq!(config, FactoryConfig::default());
    }

    #[test]
    fn partial_document() {
        let config = FactoryConfig::from_toml_str(
            r#"
            connection_string = "tcp://127.0.0.1:5680"
            drift_policy = "session-only"
            lock_duration_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.drift_policy, DriftPolicy::SessionOnly);
        assert_eq!(config.request_descriptor().lock_duration, Duration::from_secs(30));
        assert!(config.response_descriptor().requires_session);
        assert!(!config.request_descriptor().requires_session);
    }

    #[test]
    fn rejects_bad_values() {
        let same = FactoryConfig {
            response_queue: "thequeue".into(),
            ..Default::default()
        };
        assert!(matches!(same.validate(), Err(ConfigError::Invalid(_))));

        let empty = FactoryConfig {
            request_queue: String::new(),
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        let zero = FactoryConfig {
            reply_timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        assert!(matches!(
            FactoryConfig::from_toml_str("drift_policy = \"lenient\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
