// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Gateway endpoints served on a real listener over the in-process broker.

use qreply::loan::{self, GetLoanOptionsRequest, GetLoanOptionsResponse};
use qreply::{MemoryBroker, RequestResponseFactory, Shutdown};
use qreply_gateway::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn factory(reply_timeout: Duration) -> RequestResponseFactory {
    RequestResponseFactory::new(Arc::new(MemoryBroker::new()), "thequeue", "theotherqueue")
        .with_reply_timeout(reply_timeout)
}

async fn serve(factory: &RequestResponseFactory) -> String {
    let sender = factory.sender::<GetLoanOptionsRequest, GetLoanOptionsResponse>();
    let app = build_router(Arc::new(AppState::new(sender)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_loan_options_round_trip() {
    let factory = factory(Duration::from_secs(5));
    factory.ensure_entities_exist().await.unwrap();

    let (shutdown, signal) = Shutdown::new();
    let responder = factory.responder(loan::quote("BRINKLE"));
    let worker = tokio::spawn(async move { responder.respond_to_requests(signal).await });

    let base = serve(&factory).await;
    let client = reqwest::Client::new();

    for path in ["/api/values", "/api/v1/loan-options"] {
        let resp = client
            .post(format!("{}{}", base, path))
            .json(&json!({"Id": 1, "CreditScore": 700}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "{}", path);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"Provider": "BRINKLE", "LoanAmount": 2800}));
    }

    let stats: Value = client
        .get(format!("{}/api/v1/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["count"], 2);
    assert!(stats["max_ms"].as_f64().unwrap() >= stats["min_ms"].as_f64().unwrap());

    shutdown.trigger();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_timeout_maps_to_504() {
    let factory = factory(Duration::from_millis(200));
    factory.ensure_entities_exist().await.unwrap();
    let base = serve(&factory).await;

    // nobody answers
    let resp = reqwest::Client::new()
        .post(format!("{}/api/values", base))
        .json(&json!({"Id": 2, "CreditScore": 500}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 504);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 504);
}

#[tokio::test]
async fn test_missing_queues_map_to_502() {
    let factory = factory(Duration::from_secs(1));
    let base = serve(&factory).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/loan-options", base))
        .json(&json!({"Id": 3, "CreditScore": 650}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn test_health() {
    let factory = factory(Duration::from_secs(3));
    let base = serve(&factory).await;

    let resp = reqwest::get(format!("{}/api/v1/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["request_queue"], "thequeue");
    assert_eq!(body["response_queue"], "theotherqueue");
    assert_eq!(body["reply_timeout_ms"], 3000);
}
