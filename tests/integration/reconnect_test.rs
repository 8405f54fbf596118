//! Coming back online

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use relief_sync::client::sync::{ConnectivityState, EngineNotice, SyncOutcome};
use relief_sync::shared::RequestStatus;

use crate::common::*;

#[tokio::test]
async fn test_going_online_drains_then_refetches() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Offline).await;
    engine
        .request_status_change(&"r1".into(), RequestStatus::InTransit)
        .await
        .unwrap();
    engine
        .request_status_change(&"r2".into(), RequestStatus::Delivered)
        .await
        .unwrap();

    engine.watch_connectivity();
    let mut notices = engine.notices();
    engine.monitor().set_state(ConnectivityState::Online);

    let outcome = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(EngineNotice::DrainFinished(outcome)) = notices.recv().await {
                return outcome;
            }
        }
    })
    .await
    .expect("drain after reconnect");

    assert_eq!(outcome, SyncOutcome { synced: 2, failed: 0 });
    assert!(engine.pending_mutations().await.is_empty());

    let api_ref = api.clone();
    assert!(eventually(move || api_ref.queue_fetches() == 1).await);

    let calls = api.calls();
    let fetch_at = calls
        .iter()
        .position(|c| *c == RemoteCall::FetchQueue)
        .unwrap();
    let last_submit = calls
        .iter()
        .rposition(|c| matches!(c, RemoteCall::Submit { .. }))
        .unwrap();
    assert!(fetch_at > last_submit);
    assert_eq!(
        api.submitted(),
        vec![
            ("r1".to_string(), RequestStatus::InTransit),
            ("r2".to_string(), RequestStatus::Delivered),
        ]
    );
    engine.shutdown();
}

#[tokio::test]
async fn test_refresh_runs_even_when_drain_fails() {
    let api = Arc::new(FakeApi::new());
    api.fail_updates_for("r1");
    api.set_queue(pending_queue(2));
    let engine = engine_with(api.clone(), ConnectivityState::Offline).await;
    engine
        .request_status_change(&"r1".into(), RequestStatus::InTransit)
        .await
        .unwrap();

    engine.monitor().set_state(ConnectivityState::Online);
    let outcome = engine.sync_and_refresh().await;

    assert_eq!(outcome, SyncOutcome { synced: 0, failed: 1 });
    assert_eq!(api.queue_fetches(), 1);
    assert!(api.calls().contains(&RemoteCall::FetchAssigned));
    // still pending, still shown
    assert_eq!(engine.visible_queue()[1].status, RequestStatus::InTransit);
}

#[tokio::test]
async fn test_going_offline_only_notifies() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api.clone(), ConnectivityState::Online).await;
    engine.watch_connectivity();
    let mut notices = engine.notices();

    engine.monitor().set_state(ConnectivityState::Offline);

    let notice = tokio::time::timeout(Duration::from_secs(2), notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice, EngineNotice::Connectivity(ConnectivityState::Offline));
    assert!(api.calls().is_empty());
    engine.shutdown();
}
