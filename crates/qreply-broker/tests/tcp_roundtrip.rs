// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Broker daemon driven through `TcpBroker` on a loopback socket.

use qreply::broker::{Broker, BrokerError, Management};
use qreply::loan::{self, GetLoanOptionsRequest, GetLoanOptionsResponse};
use qreply::{
    Envelope, FactoryConfig, QueueDescriptor, RequestResponseFactory, SessionId, Shutdown,
    TcpBroker,
};
use qreply_broker::{BrokerConfig, BrokerServer, QueueSpec};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(2);

async fn start(config: BrokerConfig) -> (BrokerServer, String, JoinHandle<()>) {
    let server = BrokerServer::new(config).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = server.clone();
    let task = tokio::spawn(async move {
        handle.serve(listener).await.unwrap();
    });
    (server, addr, task)
}

#[tokio::test]
async fn test_management_over_tcp() {
    let (server, addr, _task) = start(BrokerConfig::default()).await;
    let broker = TcpBroker::new(addr);

    assert!(!broker.queue_exists("thequeue").await.unwrap());
    broker
        .create_queue(&QueueDescriptor::request("thequeue"))
        .await
        .unwrap();
    assert!(broker.queue_exists("thequeue").await.unwrap());
    assert_eq!(
        broker.get_queue("thequeue").await.unwrap(),
        QueueDescriptor::request("thequeue")
    );

    let err = broker
        .create_queue(&QueueDescriptor::request("thequeue"))
        .await
        .unwrap_err();
    assert_eq!(err, BrokerError::QueueAlreadyExists("thequeue".into()));

    broker.delete_queue("thequeue").await.unwrap();
    let err = broker.get_queue("thequeue").await.unwrap_err();
    assert_eq!(err, BrokerError::QueueNotFound("thequeue".into()));

    assert!(server.broker().queue_names().is_empty());
    server.shutdown();
}

#[tokio::test]
async fn test_send_receive_complete() {
    let (server, addr, _task) = start(BrokerConfig::default()).await;
    let broker = TcpBroker::new(addr);
    broker
        .create_queue(&QueueDescriptor::request("thequeue"))
        .await
        .unwrap();

    let client = broker.open_queue("thequeue").await.unwrap();
    client
        .send(Envelope::new(b"{\"n\":1}".to_vec()))
        .await
        .unwrap();

    let first = client.receive(WAIT).await.unwrap().unwrap();
    assert_eq!(first.envelope.body, b"{\"n\":1}");
    assert_eq!(first.delivery_count, 1);
    assert!(first.envelope.message_id.is_some());

    client.abandon(&first.lock_token).await.unwrap();
    let second = client.receive(WAIT).await.unwrap().unwrap();
    assert_eq!(second.delivery_count, 2);

    client.complete(&second.lock_token).await.unwrap();
    assert_eq!(server.broker().message_count("thequeue"), Some(0));

    // settled token is gone
    let err = client.complete(&second.lock_token).await.unwrap_err();
    assert!(matches!(err, BrokerError::LockLost(_)));

    assert!(client
        .receive(Duration::from_millis(50))
        .await
        .unwrap()
        .is_none());
    client.close().await.unwrap();
    assert_eq!(client.send(Envelope::new(vec![1])).await, Err(BrokerError::Closed));
}

#[tokio::test]
async fn test_disconnect_abandons_locks() {
    let (_server, addr, _task) = start(BrokerConfig {
        queues: vec![serde_json::from_str::<QueueSpec>(r#"{"name": "thequeue"}"#).unwrap()],
        ..Default::default()
    })
    .await;
    let broker = TcpBroker::new(addr);

    let producer = broker.open_queue("thequeue").await.unwrap();
    producer.send(Envelope::new(vec![7])).await.unwrap();

    let consumer = broker.open_queue("thequeue").await.unwrap();
    let locked = consumer.receive(WAIT).await.unwrap().unwrap();
    assert_eq!(locked.delivery_count, 1);
    drop(consumer);

    // redelivered long before the 60s lock would expire
    let again = producer.receive(WAIT).await.unwrap().unwrap();
    assert_eq!(again.envelope.body, vec![7]);
    assert_eq!(again.delivery_count, 2);
    producer.complete(&again.lock_token).await.unwrap();
}

#[tokio::test]
async fn test_session_receive_over_tcp() {
    let (_server, addr, _task) = start(BrokerConfig::default()).await;
    let broker = TcpBroker::new(addr);
    broker
        .create_queue(&QueueDescriptor::response("theotherqueue"))
        .await
        .unwrap();

    let mine = SessionId::generate();
    let other = SessionId::generate();
    let receiver = broker
        .accept_session("theotherqueue", &mine)
        .await
        .unwrap();

    let sender = broker.open_queue("theotherqueue").await.unwrap();
    for (session, body) in [(&other, b"theirs".to_vec()), (&mine, b"mine".to_vec())] {
        let mut envelope = Envelope::new(body);
        envelope.session_id = Some(session.as_str().to_string());
        sender.send(envelope).await.unwrap();
    }

    let err = sender.send(Envelope::new(vec![0])).await.unwrap_err();
    assert_eq!(err, BrokerError::SessionRequired("theotherqueue".into()));

    let got = receiver.receive(WAIT).await.unwrap().unwrap();
    assert_eq!(got.envelope.body, b"mine");
    receiver.complete(&got.lock_token).await.unwrap();

    let err = broker
        .accept_session("theotherqueue", &mine)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BrokerError::SessionLocked { .. }));

    receiver.close().await.unwrap();
    let reclaimed = broker
        .accept_session("theotherqueue", &mine)
        .await
        .unwrap();
    reclaimed.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_loan_exchange_over_tcp() {
    let (server, addr, task) = start(BrokerConfig::default()).await;

    let config = FactoryConfig {
        connection_string: format!("tcp://{}", addr),
        reply_timeout_ms: 5_000,
        ..Default::default()
    };
    let factory = RequestResponseFactory::connect(&config).unwrap();
    let report = factory.ensure_entities_exist().await.unwrap();
    assert!(!report.is_noop());

    let (shutdown, signal) = Shutdown::new();
    let responder = factory.responder(loan::quote("BRINKLE"));
    let worker = tokio::spawn(async move { responder.respond_to_requests(signal).await });

    let sender = factory.sender::<GetLoanOptionsRequest, GetLoanOptionsResponse>();
    for (id, score) in [(1, 700), (2, 300)] {
        let reply = sender
            .send_request(&GetLoanOptionsRequest::new(id, score))
            .await
            .unwrap();
        assert_eq!(reply.provider, "BRINKLE");
        assert_eq!(reply.loan_amount, score * 4);
    }
    assert_eq!(sender.statistics().count(), 2);

    shutdown.trigger();
    worker.await.unwrap().unwrap();

    assert_eq!(server.broker().message_count("thequeue"), Some(0));
    assert_eq!(server.broker().message_count("theotherqueue"), Some(0));

    server.shutdown();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(!server.is_running());
}

#[tokio::test]
async fn test_config_file_provisions_queues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker.json");
    std::fs::write(
        &path,
        r#"{
            "port": 5690,
            "stats_interval_secs": 0,
            "queues": [
                {"name": "thequeue"},
                {"name": "theotherqueue", "requires_session": true}
            ]
        }"#,
    )
    .unwrap();

    let config = BrokerConfig::from_file(&path).unwrap();
    config.to_file(&dir.path().join("copy.json")).unwrap();
    let copy = BrokerConfig::from_file(&dir.path().join("copy.json")).unwrap();
    assert_eq!(copy.queues, config.queues);

    let (_server, addr, _task) = start(config).await;
    let broker = TcpBroker::new(addr);
    assert!(
        broker
            .get_queue("theotherqueue")
            .await
            .unwrap()
            .requires_session
    );
    assert!(!broker.get_queue("thequeue").await.unwrap().requires_session);
}

#[tokio::test]
async fn test_serve_twice_is_rejected() {
    let (server, _addr, _task) = start(BrokerConfig::default()).await;
    // let the spawned serve mark itself running
    for _ in 0..50 {
        if server.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let err = server.serve(listener).await.unwrap_err();
    assert!(matches!(err, qreply_broker::ServerError::AlreadyRunning));
}
