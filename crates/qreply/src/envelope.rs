// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport envelope and correlation identifiers.
//!
//! An [`Envelope`] is the unit the broker moves: an opaque body plus the
//! metadata that pairs a request with its reply.
//!
//! ```text
//! request:  body | reply_to = <response queue> | reply_to_session_id = S
//! response: body | session_id = S
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlation identifier for one exchange.
///
/// 128 random bits, hex encoded without separators. Generated by the sender
/// for every call; responders only echo it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an identifier received from the wire.
    pub fn from_wire(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Broker-issued handle on one received, unacknowledged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(Uuid);

impl LockToken {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message as it travels through the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Payload bytes (UTF-8 JSON by convention)
    pub body: Vec<u8>,

    /// Broker message id, assigned on send when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Queue the reply must be sent to (requests only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// Session the reply must carry (requests only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_session_id: Option<String>,

    /// Session this message belongs to (responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Envelope {
    /// Envelope with a body and no metadata.
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    /// Message id, or `"-"` when none was assigned yet.
    pub fn message_id_or_dash(&self) -> &str {
        self.message_id.as_deref().unwrap_or("-")
    }
}

/// An envelope handed out by the broker under a delivery lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedEnvelope {
    pub envelope: Envelope,

    /// Token required to complete or abandon this delivery
    pub lock_token: LockToken,

    /// Position assigned by the broker when the message was enqueued
    pub sequence_number: u64,

    /// How many times this message has been delivered, this delivery included
    pub delivery_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_32_hex_chars() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_ids_are_not_reused() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn empty_metadata_is_omitted_on_the_wire() {
        let json = serde_json::to_string(&Envelope::new(b"{}".to_vec())).unwrap();
        assert!(!json.contains("reply_to"));
        assert!(!json.contains("session_id"));
    }
}
