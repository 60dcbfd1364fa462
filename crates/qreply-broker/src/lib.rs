// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! qreply broker daemon
//!
//! Serves a [`qreply::MemoryBroker`] to remote processes over the
//! length-prefixed JSON protocol in [`qreply::broker::wire`]. Clients reach
//! it with a `tcp://host:port` connection string.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port (5680)
//! qreply-broker
//!
//! # Custom port, queues pre-provisioned from a config file
//! qreply-broker --port 5690 --config broker.json
//! ```

pub mod config;
pub mod server;

pub use config::{BrokerConfig, ConfigError, QueueSpec};
pub use server::{BrokerServer, ServerError};
