//! State surviving a restart, and store degradation

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use relief_sync::client::offline::{OfflineStore, StoreMode};
use relief_sync::client::sync::{ConnectivityState, SyncOutcome};
use relief_sync::shared::{RequestStatus, SyncError};

use crate::common::*;

#[tokio::test]
async fn test_pending_changes_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relief.db");

    let api = Arc::new(FakeApi::new());
    {
        let store = OfflineStore::open_or_degrade(Some(path.as_path())).await;
        assert_eq!(store.mode(), StoreMode::Durable);
        let engine = engine_on(store.clone(), api.clone(), ConnectivityState::Offline).await;
        engine.replace_snapshot(pending_queue(3)).await;
        engine
            .request_status_change(&"r2".into(), RequestStatus::InTransit)
            .await
            .unwrap();
        store.close().await;
    }

    let store = OfflineStore::open_or_degrade(Some(path.as_path())).await;
    let engine = engine_on(store, api.clone(), ConnectivityState::Offline).await;

    assert_eq!(ids(&engine.visible_queue()), vec!["r0", "r1", "r2"]);
    assert_eq!(engine.visible_queue()[2].status, RequestStatus::InTransit);
    assert_eq!(engine.pending_mutations().await.len(), 1);

    engine.monitor().set_state(ConnectivityState::Online);
    assert_eq!(engine.trigger_drain().await, SyncOutcome { synced: 1, failed: 0 });
}

#[tokio::test]
async fn test_unusable_path_degrades_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let store = OfflineStore::open_or_degrade(Some(blocker.join("relief.db").as_path())).await;
    assert_eq!(store.mode(), StoreMode::MemoryOnly);

    let api = Arc::new(FakeApi::new());
    let engine = engine_on(store, api, ConnectivityState::Offline).await;
    engine
        .request_status_change(&"r1".into(), RequestStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(engine.pending_mutations().await.len(), 1);
}

#[tokio::test]
async fn test_unavailable_store_still_serves_online_paths() {
    let api = Arc::new(FakeApi::new());
    api.set_queue(pending_queue(2));
    let engine = engine_on(OfflineStore::unavailable(), api.clone(), ConnectivityState::Online).await;

    engine.load_queue().await;
    assert_eq!(engine.visible_queue().len(), 2);

    engine
        .request_status_change(&"r0".into(), RequestStatus::InTransit)
        .await
        .unwrap();
    assert_eq!(engine.visible_queue()[0].status, RequestStatus::InTransit);

    engine.monitor().set_state(ConnectivityState::Offline);
    let queued = engine
        .request_status_change(&"r1".into(), RequestStatus::InTransit)
        .await;
    assert_matches!(queued, Err(SyncError::StorageUnavailable { .. }));
}

#[tokio::test]
async fn test_user_data_roundtrip() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api, ConnectivityState::Offline).await;

    engine
        .save_user_data("volunteer", &serde_json::json!({"name": "Sam", "zone": 4}))
        .await
        .unwrap();
    let stored: Option<serde_json::Value> = engine.user_data("volunteer").await.unwrap();

    assert_eq!(stored, Some(serde_json::json!({"name": "Sam", "zone": 4})));
}
