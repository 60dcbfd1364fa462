// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for request/response exchanges.
//!
//! Failures fall into four families: transport faults raised by the broker,
//! a timeout while waiting on the reply session, decode faults on a payload,
//! and configuration faults. Nothing in this crate retries on its own.

use crate::broker::BrokerError;
use crate::codec::DecodeError;
use crate::config::ConfigError;
use crate::envelope::SessionId;
use std::time::Duration;
use thiserror::Error;

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by senders, responders, the reconciler and the factory.
#[derive(Debug, Error)]
pub enum Error {
    /// Broker connection, send, receive or management failure
    #[error("transport fault: {0}")]
    Broker(#[from] BrokerError),

    /// No reply arrived on the session before the deadline
    #[error("no reply on session {session_id} within {waited:?}")]
    Timeout {
        session_id: SessionId,
        waited: Duration,
    },

    /// Payload failed both the primary and the legacy decode
    #[error("decode fault: {0}")]
    Decode(#[from] DecodeError),

    /// Payload could not be serialized
    #[error("encode fault: {0}")]
    Encode(#[source] serde_json::Error),

    /// A request arrived without a reply destination
    #[error("request {message_id} carries no reply destination")]
    MissingReplyTo { message_id: String },

    /// A request named a reply queue but no session to answer on
    #[error("request {message_id} carries no reply session")]
    MissingReplySession { message_id: String },

    /// Invalid connection string or configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// True when the failure is a reply timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True when the failure came from the broker.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Broker(_))
    }

    /// True when a payload could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_names_session() {
        let session_id = SessionId::generate();
        let err = Error::Timeout {
            session_id: session_id.clone(),
            waited: Duration::from_secs(20),
        };
        assert!(err.is_timeout());
        assert!(!err.is_transport());
        assert!(err.to_string().contains(session_id.as_str()));
    }

    #[test]
    fn broker_errors_are_transport_faults() {
        let err: Error = BrokerError::QueueNotFound("thequeue".into()).into();
        assert!(err.is_transport());
        assert!(err.to_string().contains("thequeue"));
    }
}
