//! Offline and online action paths, effective-status overlay

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use relief_sync::client::sync::{ConnectivityState, StatusChangeOutcome};
use relief_sync::shared::{RequestRecord, RequestStatus, SyncError};

use crate::common::*;

#[tokio::test]
async fn test_offline_change_is_queued_without_remote_call() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Offline).await;

    let outcome = engine
        .request_status_change(&"r1".into(), RequestStatus::InTransit)
        .await;

    assert_matches!(outcome, Ok(StatusChangeOutcome::Queued { .. }));
    let pending = engine.pending_mutations().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id.as_str(), "r1");
    assert_eq!(pending[0].new_status, RequestStatus::InTransit);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_overlay_shows_pending_status_until_acknowledged() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Offline).await;
    engine.replace_snapshot(vec![pending("r1"), pending("r2")]).await;

    engine
        .request_status_change(&"r1".into(), RequestStatus::InTransit)
        .await
        .unwrap();

    let visible = engine.visible_queue();
    assert_eq!(visible[0].status, RequestStatus::InTransit);
    assert_eq!(visible[1].status, RequestStatus::Pending);
    assert_eq!(
        engine.effective_status(&"r1".into()).await,
        Some(RequestStatus::InTransit)
    );

    // a failed drain keeps the local intent visible
    engine.monitor().set_state(ConnectivityState::Online);
    api.fail_updates_for("r1");
    engine.trigger_drain().await;
    assert_eq!(engine.visible_queue()[0].status, RequestStatus::InTransit);

    api.heal_updates_for("r1");
    engine.trigger_drain().await;
    assert!(engine.pending_mutations().await.is_empty());
    assert_eq!(engine.visible_queue()[0].status, RequestStatus::InTransit);
}

#[tokio::test]
async fn test_latest_pending_change_wins() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api, ConnectivityState::Offline).await;
    engine.replace_snapshot(vec![pending("r1")]).await;

    engine
        .request_status_change(&"r1".into(), RequestStatus::InTransit)
        .await
        .unwrap();
    engine
        .request_status_change(&"r1".into(), RequestStatus::Delivered)
        .await
        .unwrap();

    assert_eq!(engine.pending_mutations().await.len(), 2);
    assert_eq!(engine.visible_queue()[0].status, RequestStatus::Delivered);
}

#[tokio::test]
async fn test_online_change_goes_straight_to_server() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Online).await;
    engine.replace_snapshot(vec![pending("r1")]).await;

    let outcome = engine
        .request_status_change(&"r1".into(), RequestStatus::InTransit)
        .await
        .unwrap();

    assert_eq!(outcome, StatusChangeOutcome::Applied);
    assert_eq!(api.submitted(), vec![("r1".to_string(), RequestStatus::InTransit)]);
    assert!(engine.pending_mutations().await.is_empty());
    assert_eq!(engine.visible_queue()[0].status, RequestStatus::InTransit);
}

#[tokio::test]
async fn test_online_failure_is_surfaced_not_queued() {
    let api = Arc::new(FakeApi::new());
    api.fail_updates_for("r1");
    let engine = engine_with(api, ConnectivityState::Online).await;
    engine.replace_snapshot(vec![pending("r1")]).await;

    let result = engine
        .request_status_change(&"r1".into(), RequestStatus::InTransit)
        .await;

    assert_matches!(result, Err(SyncError::RemoteCallFailed(_)));
    assert!(engine.pending_mutations().await.is_empty());
    assert_eq!(engine.visible_queue()[0].status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_dequeue_reloads_queue_and_assigned() {
    let api = Arc::new(FakeApi::new());
    api.set_queue(pending_queue(3));
    let engine = engine_with(api.clone(), ConnectivityState::Online).await;
    engine.load_queue().await;

    api.set_assigned(vec![RequestRecord::new("r0", RequestStatus::InTransit)]);

    let record = engine.dequeue_next().await.unwrap();

    assert_eq!(record.map(|r| r.id.to_string()), Some("r0".to_string()));
    assert_eq!(ids(&engine.visible_queue()), vec!["r1", "r2"]);
    assert_eq!(ids(&engine.assigned_requests()), vec!["r0"]);
}

#[tokio::test]
async fn test_delivered_assigned_request_cannot_be_reopened() {
    let api = Arc::new(FakeApi::new());
    api.set_assigned(vec![RequestRecord::new("r1", RequestStatus::Delivered)]);
    let engine = engine_with(api.clone(), ConnectivityState::Online).await;
    engine.refresh_assigned().await;
    engine.monitor().set_state(ConnectivityState::Offline);

    let result = engine
        .request_status_change(&"r1".into(), RequestStatus::Pending)
        .await;

    assert_matches!(
        result,
        Err(SyncError::InvalidTransition {
            current: RequestStatus::Delivered,
            requested: RequestStatus::Pending,
            ..
        })
    );
    assert!(engine.pending_mutations().await.is_empty());
    assert_eq!(engine.assigned_requests()[0].status, RequestStatus::Delivered);

    engine.monitor().set_state(ConnectivityState::Online);
    assert_eq!(engine.trigger_drain().await.synced, 0);
    assert!(api.submitted().is_empty());
}
