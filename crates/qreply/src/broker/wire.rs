// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker wire protocol.
//!
//! Length-prefixed JSON spoken between [`super::TcpBroker`] and the
//! `qreply-broker` daemon. Not meant to interoperate with anything else.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```
//!
//! Every request gets exactly one reply. A connection starts unbound and
//! accepts management requests; `open_queue` or `accept_session` binds it
//! to a queue (or one session of it) for the messaging requests that follow.

use super::BrokerError;
use crate::descriptor::QueueDescriptor;
use crate::envelope::{Envelope, LockToken, ReceivedEnvelope};
use serde::{Deserialize, Serialize};

/// Default upper bound for one frame (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Client-to-daemon requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BrokerRequest {
    QueueExists {
        queue: String,
    },
    GetQueue {
        queue: String,
    },
    CreateQueue {
        descriptor: QueueDescriptor,
    },
    DeleteQueue {
        queue: String,
    },

    /// Bind this connection to a queue.
    OpenQueue {
        queue: String,
    },
    /// Bind this connection to one session of a session-enabled queue.
    AcceptSession {
        queue: String,
        session_id: String,
    },

    Send {
        envelope: Envelope,
    },
    Receive {
        wait_ms: u64,
    },
    Complete {
        lock_token: LockToken,
    },
    Abandon {
        lock_token: LockToken,
    },
    /// Release the binding (and any session claim).
    Close,
}

impl BrokerRequest {
    /// Short name used in logs.
    pub fn op(&self) -> &'static str {
        match self {
            Self::QueueExists { .. } => "queue_exists",
            Self::GetQueue { .. } => "get_queue",
            Self::CreateQueue { .. } => "create_queue",
            Self::DeleteQueue { .. } => "delete_queue",
            Self::OpenQueue { .. } => "open_queue",
            Self::AcceptSession { .. } => "accept_session",
            Self::Send { .. } => "send",
            Self::Receive { .. } => "receive",
            Self::Complete { .. } => "complete",
            Self::Abandon { .. } => "abandon",
            Self::Close => "close",
        }
    }
}

/// Daemon-to-client replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BrokerReply {
    Ok,
    Exists {
        exists: bool,
    },
    Queue {
        descriptor: QueueDescriptor,
    },
    /// Result of a receive; `None` when the wait elapsed.
    Message {
        message: Option<ReceivedEnvelope>,
    },
    Error {
        code: u32,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },
}

/// Error codes carried in [`BrokerReply::Error`].
pub mod codes {
    pub const BAD_REQUEST: u32 = 400;
    pub const QUEUE_NOT_FOUND: u32 = 404;
    pub const SESSIONS_NOT_SUPPORTED: u32 = 405;
    pub const QUEUE_EXISTS: u32 = 409;
    pub const LOCK_LOST: u32 = 410;
    pub const SESSION_REQUIRED: u32 = 412;
    pub const SESSION_LOCKED: u32 = 423;
    pub const CLOSED: u32 = 499;
    pub const INTERNAL: u32 = 500;
}

impl BrokerReply {
    /// Encode a broker fault so the client can rebuild the same variant.
    pub fn from_error(err: &BrokerError) -> Self {
        let (code, subject, session) = match err {
            BrokerError::QueueNotFound(q) => (codes::QUEUE_NOT_FOUND, Some(q.clone()), None),
            BrokerError::QueueAlreadyExists(q) => (codes::QUEUE_EXISTS, Some(q.clone()), None),
            BrokerError::SessionRequired(q) => (codes::SESSION_REQUIRED, Some(q.clone()), None),
            BrokerError::SessionsNotSupported(q) => {
                (codes::SESSIONS_NOT_SUPPORTED, Some(q.clone()), None)
            }
            BrokerError::SessionLocked { queue, session } => (
                codes::SESSION_LOCKED,
                Some(queue.clone()),
                Some(session.clone()),
            ),
            BrokerError::LockLost(t) => (codes::LOCK_LOST, Some(t.clone()), None),
            BrokerError::Protocol(_) => (codes::BAD_REQUEST, None, None),
            BrokerError::Closed => (codes::CLOSED, None, None),
            BrokerError::Remote { code, .. } => (*code, None, None),
            BrokerError::Connection(_) => (codes::INTERNAL, None, None),
        };

        Self::Error {
            code,
            message: err.to_string(),
            subject,
            session,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Error {
            code: codes::BAD_REQUEST,
            message: message.into(),
            subject: None,
            session: None,
        }
    }
}

/// Rebuild a [`BrokerError`] from the fields of [`BrokerReply::Error`].
pub fn error_from_reply(
    code: u32,
    message: String,
    subject: Option<String>,
    session: Option<String>,
) -> BrokerError {
    match (code, subject, session) {
        (codes::QUEUE_NOT_FOUND, Some(q), _) => BrokerError::QueueNotFound(q),
        (codes::QUEUE_EXISTS, Some(q), _) => BrokerError::QueueAlreadyExists(q),
        (codes::SESSION_REQUIRED, Some(q), _) => BrokerError::SessionRequired(q),
        (codes::SESSIONS_NOT_SUPPORTED, Some(q), _) => BrokerError::SessionsNotSupported(q),
        (codes::SESSION_LOCKED, Some(queue), Some(session)) => {
            BrokerError::SessionLocked { queue, session }
        }
        (codes::LOCK_LOST, Some(t), _) => BrokerError::LockLost(t),
        (codes::CLOSED, _, _) => BrokerError::Closed,
        (codes::BAD_REQUEST, _, _) => BrokerError::Protocol(message),
        (code, _, _) => BrokerError::Remote { code, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_tagged_by_op() {
        let json = serde_json::to_string(&BrokerRequest::Receive { wait_ms: 250 }).unwrap();
        assert_eq!(json, r#"{"op":"receive","wait_ms":250}"#);

        let json = serde_json::to_string(&BrokerRequest::Close).unwrap();
        assert_eq!(json, r#"{"op":"close"}"#);

        let parsed: BrokerRequest =
            serde_json::from_str(r#"{"op":"open_queue","queue":"thequeue"}"#).unwrap();
        assert_eq!(parsed.op(), "open_queue");
    }

    #[test]
    fn reply_is_tagged_by_status() {
        let json = serde_json::to_string(&BrokerReply::Exists { exists: true }).unwrap();
        assert_eq!(json, r#"{"status":"exists","exists":true}"#);

        let json = serde_json::to_string(&BrokerReply::Message { message: None }).unwrap();
        assert_eq!(json, r#"{"status":"message","message":null}"#);
    }

    #[test]
    fn errors_survive_the_wire() {
        let originals = [
            BrokerError::QueueNotFound("q".into()),
            BrokerError::QueueAlreadyExists("q".into()),
            BrokerError::SessionRequired("q".into()),
            BrokerError::SessionsNotSupported("q".into()),
            BrokerError::SessionLocked {
                queue: "q".into(),
                session: "s".into(),
            },
            BrokerError::LockLost("t".into()),
            BrokerError::Closed,
        ];

        for original in originals {
            let reply = BrokerReply::from_error(&original);
            let json = serde_json::to_vec(&reply).unwrap();
            let BrokerReply::Error {
                code,
                message,
                subject,
                session,
            } = serde_json::from_slice(&json).unwrap()
            else {
                panic!("expected error reply");
            };
            assert_eq!(error_from_reply(code, message, subject, session), original);
        }
    }

    #[test]
    fn unknown_codes_become_remote() {
        let err = error_from_reply(599, "boom".into(), None, None);
        assert_eq!(
            err,
            BrokerError::Remote {
                code: 599,
                message: "boom".into()
            }
        );
    }
}
