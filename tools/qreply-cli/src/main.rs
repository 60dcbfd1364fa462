// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! qreply - request/response load tool
//!
//! Sends loan-options requests through a broker (or an HTTP gateway), runs
//! responders that answer them, and reconciles the queue topology.
//!
//! # Usage
//!
//! ```bash
//! # terminal 1: two responders against a broker daemon
//! qreply -s tcp://127.0.0.1:5680 respond 2
//!
//! # terminal 2: 50 requests, 10 ms apart
//! qreply -s tcp://127.0.0.1:5680 send 50 10
//!
//! # everything in one process
//! qreply demo 20
//! ```

mod commands;
mod console;

use clap::{Parser, Subcommand};
use colored::*;
use qreply::{FactoryConfig, RequestResponseFactory};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Request/response over message queues - test tool
#[derive(Parser, Debug)]
#[command(name = "qreply")]
#[command(version)]
#[command(about = "Send requests, run responders and reconcile queues")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Broker connection string (memory:// or tcp://host:port)
    #[arg(short, long, global = true)]
    sbconn: Option<String>,

    /// Name of the queue to use for sending requests
    #[arg(short = 'n', long, global = true)]
    qname: Option<String>,

    /// Name of the queue to use for receiving responses
    #[arg(short = 'r', long, global = true)]
    qrespond: Option<String>,

    /// Factory configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Reply timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log level or filter directive for library diagnostics
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send requests and report round-trip times
    Send {
        /// Number of requests to send
        #[arg(default_value = "1", value_parser = clap::value_parser!(i32).range(0..))]
        count: i32,

        /// Delay between requests in milliseconds
        #[arg(default_value = "1")]
        delay_ms: u64,

        /// Send through an HTTP gateway instead (e.g. http://localhost:8080/api/values)
        http_endpoint: Option<String>,
    },
    /// Answer requests until Ctrl+C
    Respond {
        /// Number of consumers to run
        #[arg(default_value = "1")]
        consumers: usize,

        /// Provider named in every response
        #[arg(long, default_value = "BRINKLE")]
        provider: String,
    },
    /// Create or repair both queues and report what changed
    Ensure,
    /// Run responders and a sender in one process
    Demo {
        /// Number of requests to send
        #[arg(default_value = "10", value_parser = clap::value_parser!(i32).range(0..))]
        count: i32,

        /// Number of consumers to run
        #[arg(default_value = "2")]
        consumers: usize,

        /// Delay between requests in milliseconds
        #[arg(long, default_value = "1")]
        delay_ms: u64,

        /// Provider named in every response
        #[arg(long, default_value = "BRINKLE")]
        provider: String,
    },
    /// Print a sample configuration file
    GenConfig {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> commands::CliResult<()> {
    if let Command::GenConfig { output } = &args.command {
        let sample = FactoryConfig::sample_toml();
        match output {
            Some(path) => {
                std::fs::write(path, sample)?;
                eprintln!("{} Wrote {}", ">>>".green().bold(), path.display());
            }
            None => print!("{}", sample),
        }
        return Ok(());
    }

    println!("qreply test tool");
    println!("=============================");

    let config = load_config(&args)?;
    let factory = RequestResponseFactory::connect(&config)?;
    let report = factory.ensure_entities_exist().await?;
    tracing::debug!("reconciled: {:?}", report);

    match args.command {
        Command::Send {
            count,
            delay_ms,
            http_endpoint,
        } => {
            commands::send(
                &factory,
                count,
                Duration::from_millis(delay_ms),
                http_endpoint.as_deref(),
            )
            .await
        }
        Command::Respond {
            consumers,
            provider,
        } => commands::respond(&factory, consumers, &provider).await,
        Command::Ensure => {
            commands::print_report(&factory, &report);
            Ok(())
        }
        Command::Demo {
            count,
            consumers,
            delay_ms,
            provider,
        } => {
            commands::demo(
                &factory,
                count,
                consumers,
                Duration::from_millis(delay_ms),
                &provider,
            )
            .await
        }
        Command::GenConfig { .. } => Ok(()),
    }
}

/// Config file (or defaults) with command-line overrides on top.
fn load_config(args: &Args) -> commands::CliResult<FactoryConfig> {
    let mut config = match &args.config {
        Some(path) => FactoryConfig::from_file(path)?,
        None => FactoryConfig::default(),
    };
    if let Some(conn) = &args.sbconn {
        config.connection_string = conn.clone();
    }
    if let Some(name) = &args.qname {
        config.request_queue = name.clone();
    }
    if let Some(name) = &args.qrespond {
        config.response_queue = name.clone();
    }
    if let Some(ms) = args.timeout_ms {
        config.reply_timeout_ms = ms;
    }
    Ok(config)
}
