//! Drain ordering, partial failure and overlap

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use relief_sync::client::sync::{ConnectivityState, SyncOutcome};
use relief_sync::shared::RequestStatus;

use crate::common::*;

#[tokio::test]
async fn test_drain_replays_in_enqueue_order() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Offline).await;

    let changes = [
        ("r3", RequestStatus::InTransit),
        ("r1", RequestStatus::InTransit),
        ("r3", RequestStatus::Delivered),
        ("r2", RequestStatus::InTransit),
        ("r1", RequestStatus::Delivered),
    ];
    for (id, status) in changes {
        engine
            .request_status_change(&id.into(), status)
            .await
            .unwrap();
    }
    let keys: Vec<_> = engine
        .pending_mutations()
        .await
        .iter()
        .map(|m| m.idempotency_key)
        .collect();

    engine.monitor().set_state(ConnectivityState::Online);
    let outcome = engine.trigger_drain().await;

    assert_eq!(outcome, SyncOutcome { synced: 5, failed: 0 });
    let expected: Vec<_> = changes
        .iter()
        .map(|(id, status)| (id.to_string(), *status))
        .collect();
    assert_eq!(api.submitted(), expected);
    assert_eq!(api.submitted_keys(), keys);
    assert!(engine.pending_mutations().await.is_empty());
}

#[tokio::test]
async fn test_partial_failure_keeps_only_failed_mutation() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Offline).await;

    for id in ["r0", "r1", "r2", "r3"] {
        engine
            .request_status_change(&id.into(), RequestStatus::InTransit)
            .await
            .unwrap();
    }
    let failing = engine.pending_mutations().await[2].clone();

    engine.monitor().set_state(ConnectivityState::Online);
    api.fail_updates_for("r2");

    let first = engine.trigger_drain().await;
    assert_eq!(first, SyncOutcome { synced: 3, failed: 1 });

    let left = engine.pending_mutations().await;
    assert_eq!(left, vec![failing.clone()]);

    api.heal_updates_for("r2");
    let second = engine.trigger_drain().await;
    assert_eq!(second, SyncOutcome { synced: 1, failed: 0 });
    assert!(engine.pending_mutations().await.is_empty());

    // the retry carried the same key as the failed attempt
    let keys = api.submitted_keys();
    assert_eq!(keys[2], failing.idempotency_key);
    assert_eq!(keys[4], failing.idempotency_key);
}

#[tokio::test]
async fn test_overlapping_drains_submit_each_mutation_once() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Offline).await;
    for id in ["r0", "r1", "r2"] {
        engine
            .request_status_change(&id.into(), RequestStatus::Delivered)
            .await
            .unwrap();
    }

    engine.monitor().set_state(ConnectivityState::Online);
    api.set_submit_delay(Duration::from_millis(20));

    let (a, b) = tokio::join!(engine.trigger_drain(), engine.trigger_drain());

    assert_eq!(a.synced + b.synced, 3);
    assert_eq!(a.failed + b.failed, 0);
    assert!(a.is_noop() || b.is_noop());
    assert_eq!(api.submitted().len(), 3);
}

#[tokio::test]
async fn test_drain_metrics_accumulate() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Offline).await;
    engine
        .request_status_change(&"r0".into(), RequestStatus::InTransit)
        .await
        .unwrap();
    engine
        .request_status_change(&"r1".into(), RequestStatus::InTransit)
        .await
        .unwrap();
    api.fail_updates_for("r1");

    engine.monitor().set_state(ConnectivityState::Online);
    engine.trigger_drain().await;

    let metrics = engine.metrics().await;
    assert_eq!(metrics.total_drains, 1);
    assert_eq!(metrics.total_synced, 1);
    assert_eq!(metrics.total_failed, 1);

    let status = engine.status().await;
    assert_eq!(status.pending_mutations, 1);
    assert_eq!(status.last_drain, Some(SyncOutcome { synced: 1, failed: 1 }));
    assert!(!status.is_draining);
}
