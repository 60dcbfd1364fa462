// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Topology reconciliation against the in-process broker.

use qreply::broker::Management;
use qreply::{
    Broker, DriftPolicy, Envelope, MemoryBroker, QueueDescriptor, ReconcileAction,
    RequestResponseFactory, TopologyReconciler,
};
use std::sync::Arc;
use std::time::Duration;

fn targets() -> (QueueDescriptor, QueueDescriptor) {
    (
        QueueDescriptor::request("thequeue"),
        QueueDescriptor::response("theotherqueue"),
    )
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let broker = MemoryBroker::new();
    let (rq, rs) = targets();
    let reconciler = TopologyReconciler::new(&broker, DriftPolicy::Strict);

    let first = reconciler.ensure(&rq, &rs).await.unwrap();
    assert_eq!(first.request, ReconcileAction::Created);
    assert_eq!(first.response, ReconcileAction::Created);
    let after_first = broker.stats();

    let second = reconciler.ensure(&rq, &rs).await.unwrap();
    assert!(second.is_noop());

    let after_second = broker.stats();
    assert_eq!(after_second.queues_created, after_first.queues_created);
    assert_eq!(after_second.queues_deleted, 0);
}

#[tokio::test]
async fn test_session_drift_on_request_queue_is_repaired() {
    let broker = MemoryBroker::new();
    let (rq, rs) = targets();
    // wrong for the request role
    broker
        .create_queue(&rq.clone().with_session(true))
        .await
        .unwrap();

    let report = TopologyReconciler::new(&broker, DriftPolicy::SessionOnly)
        .ensure(&rq, &rs)
        .await
        .unwrap();
    assert_eq!(report.request, ReconcileAction::Recreated);
    assert_eq!(report.response, ReconcileAction::Created);

    let live = broker.get_queue("thequeue").await.unwrap();
    assert!(!live.requires_session);
    assert_eq!(broker.stats().queues_deleted, 1);
}

#[tokio::test]
async fn test_policies_disagree_on_short_lock() {
    let (rq, rs) = targets();
    let short = rs.clone().with_lock_duration(Duration::from_secs(5));

    let lenient = MemoryBroker::new();
    lenient.create_queue(&short).await.unwrap();
    let report = TopologyReconciler::new(&lenient, DriftPolicy::SessionOnly)
        .ensure(&rq, &rs)
        .await
        .unwrap();
    assert_eq!(report.response, ReconcileAction::Unchanged);
    assert_eq!(
        lenient.get_queue("theotherqueue").await.unwrap().lock_duration,
        Duration::from_secs(5)
    );

    let strict = MemoryBroker::new();
    strict.create_queue(&short).await.unwrap();
    let report = TopologyReconciler::new(&strict, DriftPolicy::Strict)
        .ensure(&rq, &rs)
        .await
        .unwrap();
    assert_eq!(report.response, ReconcileAction::Recreated);
    assert_eq!(
        strict.get_queue("theotherqueue").await.unwrap().lock_duration,
        Duration::from_secs(60)
    );
}

#[tokio::test]
async fn test_recreation_drops_queued_messages() {
    let broker = Arc::new(MemoryBroker::new());
    let (rq, rs) = targets();
    broker
        .create_queue(&rq.clone().with_time_to_live(Duration::from_secs(10)))
        .await
        .unwrap();

    let client = broker.open_queue("thequeue").await.unwrap();
    client.send(Envelope::new(b"{}".to_vec())).await.unwrap();
    assert_eq!(broker.message_count("thequeue"), Some(1));

    let factory = RequestResponseFactory::new(broker.clone(), "thequeue", "theotherqueue")
        .with_descriptors(rq, rs);
    let report = factory.ensure_entities_exist().await.unwrap();
    assert_eq!(report.request, ReconcileAction::Recreated);
    assert_eq!(broker.message_count("thequeue"), Some(0));
}
