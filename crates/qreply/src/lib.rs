// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response over message queues
//!
//! Gives callers RPC-style "send and wait for the answer" on top of a
//! decoupled, at-least-once queue broker.
//!
//! # Features
//!
//! - **Session correlation**: every call claims a fresh reply session before
//!   its request leaves, so replies can never cross between callers
//! - **Serial responders**: one in-flight delivery per responder, manual
//!   acknowledgment, scale out by running more of them
//! - **Topology reconciliation**: idempotent create-or-repair of both queues
//!   under an explicit [`DriftPolicy`]
//! - **Legacy payloads**: JSON codec with a one-shot fallback for
//!   comma-prefixed bodies
//! - **Brokers**: in-process (`memory://`) or the `qreply-broker` daemon
//!   (`tcp://host:port`)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use qreply::loan::{self, GetLoanOptionsRequest, GetLoanOptionsResponse};
//! use qreply::{FactoryConfig, RequestResponseFactory, Shutdown};
//!
//! # async fn example() -> qreply::Result<()> {
//! let factory = RequestResponseFactory::connect(&FactoryConfig::default())?;
//! factory.ensure_entities_exist().await?;
//!
//! let (shutdown, signal) = Shutdown::new();
//! let responder = factory.responder(loan::quote("BRINKLE"));
//! let worker = tokio::spawn(async move { responder.respond_to_requests(signal).await });
//!
//! let sender = factory.sender::<GetLoanOptionsRequest, GetLoanOptionsResponse>();
//! let reply = sender.send_request(&GetLoanOptionsRequest::new(1, 700)).await?;
//! assert_eq!(reply.loan_amount, 2800);
//!
//! shutdown.trigger();
//! let _ = worker.await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! connection_string = "tcp://127.0.0.1:5680"
//! request_queue = "thequeue"
//! response_queue = "theotherqueue"
//! reply_timeout_ms = 20000
//! drift_policy = "strict"
//! ```

pub mod broker;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod factory;
pub mod loan;
pub mod observer;
pub mod reconcile;
pub mod responder;
pub mod sender;
pub mod shutdown;
pub mod stats;

pub use broker::{Broker, BrokerError, Management, MemoryBroker, TcpBroker};
pub use config::{ConfigError, FactoryConfig};
pub use descriptor::{DriftPolicy, QueueDescriptor};
pub use envelope::{Envelope, LockToken, ReceivedEnvelope, SessionId};
pub use error::{Error, Result};
pub use factory::RequestResponseFactory;
pub use observer::{NoopObserver, ResponderObserver, SenderObserver, TracingObserver};
pub use reconcile::{ReconcileAction, ReconcileReport, TopologyReconciler};
pub use responder::{RequestHandler, Responder};
pub use sender::Sender;
pub use shutdown::{Shutdown, ShutdownSignal};
pub use stats::RoundTripStats;
