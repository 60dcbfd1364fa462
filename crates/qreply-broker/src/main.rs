// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! qreply broker daemon
//!
//! Serves in-memory queues to `tcp://host:port` clients so senders and
//! responders can run in separate processes.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port (5680)
//! qreply-broker
//!
//! # Custom port, pre-provisioned queues from a config file
//! qreply-broker --port 5690 --config broker.json
//! ```

use clap::Parser;
use qreply_broker::{BrokerConfig, BrokerServer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// qreply broker - queue daemon for request/response exchanges
#[derive(Parser, Debug)]
#[command(name = "qreply-broker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "5680")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between statistics lines (0 = off)
    #[arg(long, default_value = "60")]
    stats_interval: u64,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = if let Some(config_path) = &args.config {
        BrokerConfig::from_file(config_path)?
    } else {
        BrokerConfig {
            bind_address: args.bind.parse()?,
            port: args.port,
            stats_interval_secs: args.stats_interval,
            log_level: args.log_level.clone(),
            ..Default::default()
        }
    };

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    if let Some(config_path) = &args.config {
        info!("Loaded config from {:?}", config_path);
    }

    let addr = config.socket_addr();
    info!("+----------------------------------------------------+");
    info!(
        "|       qreply broker v{}                         |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:   {:40} |", addr);
    info!("|  Queues: {:40} |", config.queues.len());
    info!(
        "|  Frame:  {:40} |",
        format!("{} bytes max", config.max_message_size)
    );
    info!("+----------------------------------------------------+");

    let server = BrokerServer::new(config).await?;

    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping broker...");
        server_handle.shutdown();
    });

    server.run().await?;

    info!("Broker stopped");
    Ok(())
}
