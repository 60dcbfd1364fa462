// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! qreply gateway binary
//!
//! # Usage
//!
//! ```bash
//! # Gateway on port 8080 against a local broker daemon
//! qreply-gateway --sbconn tcp://127.0.0.1:5680
//!
//! # Settings from a factory config file
//! qreply-gateway --config qreply.toml --port 9000
//! ```

use clap::Parser;
use qreply::loan::{GetLoanOptionsRequest, GetLoanOptionsResponse};
use qreply::{FactoryConfig, RequestResponseFactory};
use qreply_gateway::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// qreply HTTP gateway
#[derive(Parser, Debug)]
#[command(name = "qreply-gateway")]
#[command(about = "HTTP gateway for qreply loan-options exchanges")]
#[command(version)]
struct Args {
    /// HTTP server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Factory configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker connection string (overrides the config file)
    #[arg(short, long)]
    sbconn: Option<String>,

    /// Request queue name
    #[arg(short = 'n', long)]
    qname: Option<String>,

    /// Response queue name
    #[arg(short = 'r', long)]
    qrespond: Option<String>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => FactoryConfig::from_file(path)?,
        None => FactoryConfig::default(),
    };
    if let Some(conn) = args.sbconn {
        config.connection_string = conn;
    }
    if let Some(name) = args.qname {
        config.request_queue = name;
    }
    if let Some(name) = args.qrespond {
        config.response_queue = name;
    }

    let factory = RequestResponseFactory::connect(&config)?;
    let report = factory.ensure_entities_exist().await?;
    info!(
        "Queues: {} {}, {} {}",
        config.request_queue, report.request, config.response_queue, report.response
    );

    let sender = factory.sender::<GetLoanOptionsRequest, GetLoanOptionsResponse>();
    let state = Arc::new(AppState::new(sender));
    let app = build_router(state);

    let addr = format!("{}:{}", args.bind, args.port);
    info!("qreply gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("HTTP server: http://{}", addr);
    info!("Broker: {}", config.connection_string);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
