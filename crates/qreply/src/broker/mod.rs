// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker abstraction.
//!
//! The exchange logic only sees these traits. Two implementations ship with
//! the crate:
//!
//! - [`memory::MemoryBroker`] - process-local queues (`memory://`)
//! - [`tcp::TcpBroker`] - client for the `qreply-broker` daemon (`tcp://host:port`)
//!
//! # Connections
//!
//! [`Broker::open_queue`] and [`Broker::accept_session`] each hand out an
//! independent handle. Over TCP every handle is its own socket, so a sender's
//! session receiver or a responder's reply client is a transient connection
//! that is closed once the exchange step is done.

use crate::descriptor::QueueDescriptor;
use crate::envelope::{Envelope, LockToken, ReceivedEnvelope, SessionId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod connection;
pub mod memory;
pub mod tcp;
pub mod wire;

pub use memory::{BrokerStats, MemoryBroker};
pub use tcp::TcpBroker;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Faults raised by a broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("queue already exists: {0}")]
    QueueAlreadyExists(String),

    /// Message sent to a session queue without a session id
    #[error("queue {0} requires a session id on every message")]
    SessionRequired(String),

    /// Session accept on a queue without sessions
    #[error("queue {0} does not support sessions")]
    SessionsNotSupported(String),

    /// Another receiver holds the session
    #[error("session {session} on queue {queue} is locked by another receiver")]
    SessionLocked { queue: String, session: String },

    /// Lock token unknown or expired
    #[error("lock {0} lost or expired")]
    LockLost(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// Fault reported by a remote broker that has no local variant
    #[error("remote broker error {code}: {message}")]
    Remote { code: u32, message: String },

    /// Handle used after `close()`
    #[error("handle already closed")]
    Closed,
}

/// Queue management operations.
#[async_trait]
pub trait Management: Send + Sync {
    async fn queue_exists(&self, name: &str) -> BrokerResult<bool>;

    /// Live configuration of an existing queue.
    async fn get_queue(&self, name: &str) -> BrokerResult<QueueDescriptor>;

    async fn create_queue(&self, descriptor: &QueueDescriptor) -> BrokerResult<()>;

    async fn delete_queue(&self, name: &str) -> BrokerResult<()>;
}

/// Handle on a single queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Name of the queue this handle is bound to.
    fn queue(&self) -> &str;

    async fn send(&self, envelope: Envelope) -> BrokerResult<()>;

    /// Wait up to `wait` for one message and lock it.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn receive(&self, wait: Duration) -> BrokerResult<Option<ReceivedEnvelope>>;

    /// Acknowledge a delivery; the message leaves the queue.
    async fn complete(&self, lock: &LockToken) -> BrokerResult<()>;

    /// Release a delivery so it can be received again.
    async fn abandon(&self, lock: &LockToken) -> BrokerResult<()>;

    async fn close(&self) -> BrokerResult<()>;
}

/// Exclusive claim over one session of a session-enabled queue.
#[async_trait]
pub trait SessionReceiver: Send + Sync {
    fn session_id(&self) -> &SessionId;

    /// Wait up to `wait` for the next message of this session.
    async fn receive(&self, wait: Duration) -> BrokerResult<Option<ReceivedEnvelope>>;

    async fn complete(&self, lock: &LockToken) -> BrokerResult<()>;

    /// Release the session claim.
    async fn close(&self) -> BrokerResult<()>;
}

/// A message broker: management plus messaging handles.
#[async_trait]
pub trait Broker: Management {
    async fn open_queue(&self, name: &str) -> BrokerResult<Box<dyn QueueClient>>;

    async fn accept_session(
        &self,
        queue: &str,
        session_id: &SessionId,
    ) -> BrokerResult<Box<dyn SessionReceiver>>;
}

/// Resolve a connection string to a broker.
///
/// - `memory://` (any suffix) creates a fresh in-process broker
/// - `tcp://host:port` connects to a `qreply-broker` daemon
pub fn connect(connection_string: &str) -> Result<Arc<dyn Broker>, crate::config::ConfigError> {
    use crate::config::ConfigError;

    let trimmed = connection_string.trim();
    if trimmed.starts_with("memory://") {
        return Ok(Arc::new(MemoryBroker::new()));
    }
    if let Some(addr) = trimmed.strip_prefix("tcp://") {
        if addr.is_empty() || !addr.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "tcp connection string needs host:port, got '{}'",
                connection_string
            )));
        }
        return Ok(Arc::new(TcpBroker::new(addr)));
    }

    Err(ConfigError::Invalid(format!(
        "unsupported connection string '{}' (expected memory:// or tcp://host:port)",
        connection_string
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_strings() {
        assert!(connect("memory://").is_ok());
        assert!(connect("memory://local").is_ok());
        assert!(connect("tcp://127.0.0.1:5680").is_ok());
        assert!(connect("tcp://").is_err());
        assert!(connect("tcp://localhost").is_err());
        assert!(connect("amqp://broker").is_err());
        assert!(connect("{connection string goes here}").is_err());
    }

    #[test]
    fn error_display() {
        let err = BrokerError::SessionLocked {
            queue: "theotherqueue".into(),
            session: "abc".into(),
        };
        assert!(err.to_string().contains("abc"));
        assert!(BrokerError::LockLost("t".into()).to_string().contains("lost"));
    }
}
