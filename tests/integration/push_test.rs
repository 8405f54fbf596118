//! Push events applied through the engine

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use relief_sync::client::sync::{ConnectivityState, EngineNotice, RegressionSource};
use relief_sync::shared::{PushEvent, RequestStatus};

use crate::common::*;

#[tokio::test]
async fn test_queue_updated_replaces_snapshot() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api, ConnectivityState::Online).await;
    engine.replace_snapshot(pending_queue(5)).await;

    engine
        .handle_push(PushEvent::QueueUpdated {
            queue: vec![pending("x1")],
        })
        .await;

    assert_eq!(ids(&engine.visible_queue()), vec!["x1"]);
}

#[tokio::test]
async fn test_status_updated_applies_forward_change() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api, ConnectivityState::Online).await;
    engine.replace_snapshot(pending_queue(2)).await;

    engine
        .handle_push(PushEvent::StatusUpdated {
            request_id: "r1".into(),
            new_status: RequestStatus::InTransit,
        })
        .await;

    assert_eq!(engine.visible_queue()[1].status, RequestStatus::InTransit);
}

#[tokio::test]
async fn test_delivered_record_is_not_moved_back() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api, ConnectivityState::Online).await;
    engine
        .replace_snapshot(vec![pending("r1").with_status(RequestStatus::Delivered)])
        .await;
    let mut notices = engine.notices();

    engine
        .handle_push(PushEvent::StatusUpdated {
            request_id: "r1".into(),
            new_status: RequestStatus::InTransit,
        })
        .await;

    assert_eq!(engine.visible_queue()[0].status, RequestStatus::Delivered);
    assert_matches!(
        notices.try_recv(),
        Ok(EngineNotice::Inconsistency {
            cached: RequestStatus::Delivered,
            reported: RequestStatus::InTransit,
            source: RegressionSource::Push,
            ..
        })
    );
}

#[tokio::test]
async fn test_delivered_assigned_copy_is_not_moved_back_by_stale_snapshot() {
    let api = Arc::new(FakeApi::new());
    api.set_assigned(vec![pending("r1").with_status(RequestStatus::Delivered)]);
    let engine = engine_with(api.clone(), ConnectivityState::Online).await;
    engine.replace_snapshot(vec![pending("r1")]).await;
    engine.refresh_assigned().await;
    let mut notices = engine.notices();

    engine
        .handle_push(PushEvent::StatusUpdated {
            request_id: "r1".into(),
            new_status: RequestStatus::InTransit,
        })
        .await;

    assert_eq!(engine.assigned_requests()[0].status, RequestStatus::Delivered);
    assert_eq!(engine.visible_queue()[0].status, RequestStatus::Pending);
    assert_matches!(
        notices.try_recv(),
        Ok(EngineNotice::Inconsistency {
            cached: RequestStatus::Delivered,
            reported: RequestStatus::InTransit,
            source: RegressionSource::Push,
            ..
        })
    );
}

#[tokio::test]
async fn test_new_request_refetches_queue() {
    let api = Arc::new(FakeApi::new());
    api.set_queue(pending_queue(2));
    let engine = engine_with(api.clone(), ConnectivityState::Online).await;
    let mut notices = engine.notices();

    engine
        .handle_push(PushEvent::NewRequest {
            request: serde_json::json!({"_id": "r9", "name": "Amal"}),
        })
        .await;

    assert_eq!(api.queue_fetches(), 1);
    assert_eq!(engine.visible_queue().len(), 2);
    assert_matches!(
        notices.try_recv(),
        Ok(EngineNotice::NewRequest { name: Some(ref name) }) if name == "Amal"
    );
}

#[tokio::test]
async fn test_alert_has_no_state_effect() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Online).await;
    engine.replace_snapshot(pending_queue(1)).await;
    let mut notices = engine.notices();
    let mut visible = engine.subscribe_visible();
    visible.borrow_and_update();

    engine
        .handle_push(PushEvent::HighPriorityAlert {
            message: "Medical emergency reported".to_string(),
        })
        .await;

    assert!(!visible.has_changed().unwrap());
    assert!(api.calls().is_empty());
    assert_matches!(notices.try_recv(), Ok(EngineNotice::HighPriorityAlert(_)));
}
