// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subcommand implementations.

use crate::console::{app_message, Console, ConsoleObserver};
use colored::*;
use parking_lot::Mutex;
use qreply::loan::{self, GetLoanOptionsRequest, GetLoanOptionsResponse};
use qreply::{ReconcileReport, RequestResponseFactory, RoundTripStats, Shutdown, ShutdownSignal};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// `send`: fire `count` concurrent requests, `delay` apart.
pub async fn send(
    factory: &RequestResponseFactory,
    count: i32,
    delay: Duration,
    endpoint: Option<&str>,
) -> CliResult<()> {
    let endpoint = endpoint.map(reqwest::Url::parse).transpose()?;

    let (console, writer) = Console::start();
    let started = Instant::now();
    console.line("Sending requests...");

    let stats = match endpoint {
        None => send_over_queue(factory, &console, count, delay).await,
        Some(url) => send_over_http(&console, url, count, delay).await,
    };

    writer.stop().await;
    print_round_trips(&stats);
    app_message(format!(
        "Execution time (sec): {:.3}",
        started.elapsed().as_secs_f64()
    ));
    Ok(())
}

/// `respond`: run `consumers` responders until Ctrl+C.
pub async fn respond(
    factory: &RequestResponseFactory,
    consumers: usize,
    provider: &str,
) -> CliResult<()> {
    let (console, writer) = Console::start();
    let (shutdown, signal) = Shutdown::new();
    let mut workers = spawn_responders(factory, &console, consumers, provider, &signal);
    console.line("Listening on the queue...");

    let mut processed = 0;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            app_message("Canceling operation...");
        }
        Some(finished) = workers.join_next() => {
            // a responder only returns early on a fatal fault
            processed += settle(finished, &console);
        }
    }

    shutdown.trigger();
    processed += join_responders(workers, &console).await;
    writer.stop().await;
    app_message(format!("Requests processed: {}", processed));
    Ok(())
}

/// `demo`: responders and a sender in one process.
pub async fn demo(
    factory: &RequestResponseFactory,
    count: i32,
    consumers: usize,
    delay: Duration,
    provider: &str,
) -> CliResult<()> {
    let (console, writer) = Console::start();
    let (shutdown, signal) = Shutdown::new();
    let workers = spawn_responders(factory, &console, consumers, provider, &signal);

    let started = Instant::now();
    console.line("Sending requests...");
    let stats = send_over_queue(factory, &console, count, delay).await;

    shutdown.trigger();
    let processed = join_responders(workers, &console).await;
    writer.stop().await;

    print_round_trips(&stats);
    app_message(format!(
        "Execution time (sec): {:.3}",
        started.elapsed().as_secs_f64()
    ));
    app_message(format!("Requests processed: {}", processed));
    Ok(())
}

/// Print what reconciliation did to each queue.
pub fn print_report(factory: &RequestResponseFactory, report: &ReconcileReport) {
    for (name, action) in [
        (&factory.request_descriptor().name, report.request),
        (&factory.response_descriptor().name, report.response),
    ] {
        println!("{} {}: {}", ">>>".green().bold(), name, action);
    }
}

async fn send_over_queue(
    factory: &RequestResponseFactory,
    console: &Console,
    count: i32,
    delay: Duration,
) -> RoundTripStats {
    let sender = Arc::new(
        factory
            .sender::<GetLoanOptionsRequest, GetLoanOptionsResponse>()
            .with_observer(ConsoleObserver::new(console.clone())),
    );

    let mut outstanding = JoinSet::new();
    for id in 0..count {
        let request = GetLoanOptionsRequest::new(id, fastrand::i32(300..=800));
        let sender = sender.clone();
        let console = console.clone();
        outstanding.spawn(async move {
            match sender.send_request(&request).await {
                Ok(response) => console.line(format!(
                    "{:03} RESPONSE: Provider = {}, Loan = {}",
                    id, response.provider, response.loan_amount
                )),
                Err(e) => console.line(format!("{:03} Failure: {}", id, e)),
            }
        });
        tokio::time::sleep(delay).await;
    }
    while outstanding.join_next().await.is_some() {}

    sender.statistics()
}

async fn send_over_http(
    console: &Console,
    url: reqwest::Url,
    count: i32,
    delay: Duration,
) -> RoundTripStats {
    let client = reqwest::Client::new();
    let stats = Arc::new(Mutex::new(RoundTripStats::new()));

    let mut outstanding = JoinSet::new();
    for id in 0..count {
        let request = GetLoanOptionsRequest::new(id, fastrand::i32(300..=800));
        let client = client.clone();
        let url = url.clone();
        let stats = stats.clone();
        let console = console.clone();
        outstanding.spawn(async move {
            console.line(format!(
                "{:03} REQUEST: CreditScore = {}",
                id, request.credit_score
            ));
            let started = Instant::now();
            match post_loan_request(&client, url, &request).await {
                Ok(response) => {
                    stats.lock().record(started.elapsed());
                    console.line(format!(
                        "{:03} RESPONSE: Provider = {}, Loan = {}",
                        id, response.provider, response.loan_amount
                    ));
                }
                Err(e) => console.line(format!("{:03} Failure: {}", id, e)),
            }
        });
        tokio::time::sleep(delay).await;
    }
    while outstanding.join_next().await.is_some() {}

    let stats = *stats.lock();
    stats
}

async fn post_loan_request(
    client: &reqwest::Client,
    url: reqwest::Url,
    request: &GetLoanOptionsRequest,
) -> Result<GetLoanOptionsResponse, reqwest::Error> {
    client
        .post(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(request)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

fn spawn_responders(
    factory: &RequestResponseFactory,
    console: &Console,
    consumers: usize,
    provider: &str,
    signal: &ShutdownSignal,
) -> JoinSet<qreply::Result<u64>> {
    let mut workers = JoinSet::new();
    for _ in 0..consumers {
        let responder = factory
            .responder(loan::quote(provider))
            .with_observer(ConsoleObserver::new(console.clone()));
        let signal = signal.clone();
        workers.spawn(async move {
            responder.respond_to_requests(signal).await?;
            Ok(responder.requests_processed())
        });
    }
    workers
}

async fn join_responders(mut workers: JoinSet<qreply::Result<u64>>, console: &Console) -> u64 {
    let mut processed = 0;
    while let Some(finished) = workers.join_next().await {
        processed += settle(finished, console);
    }
    processed
}

fn settle(finished: Result<qreply::Result<u64>, JoinError>, console: &Console) -> u64 {
    match finished {
        Ok(Ok(processed)) => processed,
        Ok(Err(e)) => {
            console.line(format!("Fatal: {}", e).red().to_string());
            0
        }
        Err(e) => {
            console.line(format!("Fatal: responder task failed: {}", e).red().to_string());
            0
        }
    }
}

fn print_round_trips(stats: &RoundTripStats) {
    app_message(format!(
        "Average Round Trip Time (sec): {:.3}",
        stats.mean_ms() / 1000.0
    ));
    app_message(format!(
        "Min Round Trip Time (sec): {:.3}",
        stats.min_ms() / 1000.0
    ));
    app_message(format!(
        "Max Round Trip Time (sec): {:.3}",
        stats.max_ms() / 1000.0
    ));
}
