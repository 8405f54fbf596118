//! Snapshot replacement: atomicity, idempotent replay, cache fallback

use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;

use relief_sync::client::local_db::LocalDatabase;
use relief_sync::client::offline::{OfflineStore, SnapshotCache};
use relief_sync::client::sync::{ConnectivityState, QueueSource};

use crate::common::*;

#[tokio::test]
async fn test_visible_queue_never_shows_partial_snapshot() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api, ConnectivityState::Online).await;

    let mut rx = engine.subscribe_visible();
    let observer = tokio::spawn(async move {
        let mut seen = BTreeSet::new();
        while rx.changed().await.is_ok() {
            let len = rx.borrow_and_update().len();
            seen.insert(len);
            if len == 3 {
                break;
            }
        }
        seen
    });

    engine.replace_snapshot(pending_queue(50)).await;
    engine.replace_snapshot(pending_queue(3)).await;

    let seen = observer.await.unwrap();
    assert!(seen.iter().all(|len| *len == 50 || *len == 3), "saw {:?}", seen);
    assert_eq!(engine.visible_queue().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cached_snapshot_never_read_half_written() {
    let store = OfflineStore::from_database(LocalDatabase::in_memory().await.unwrap());
    let cache = SnapshotCache::new(store.clone());
    cache.replace(&pending_queue(50)).await.unwrap();

    let reader = {
        let cache = SnapshotCache::new(store.clone());
        tokio::spawn(async move {
            let mut lens = BTreeSet::new();
            for _ in 0..50 {
                lens.insert(cache.load().await.unwrap().len());
                tokio::task::yield_now().await;
            }
            lens
        })
    };

    for round in 0..10 {
        let size = if round % 2 == 0 { 3 } else { 50 };
        cache.replace(&pending_queue(size)).await.unwrap();
    }

    let lens = reader.await.unwrap();
    assert!(lens.iter().all(|len| *len == 50 || *len == 3), "read {:?}", lens);
}

#[tokio::test]
async fn test_identical_snapshot_replay_is_silent() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api, ConnectivityState::Online).await;
    let snapshot = pending_queue(4);

    engine.replace_snapshot(snapshot.clone()).await;
    let mut rx = engine.subscribe_visible();
    rx.borrow_and_update();

    engine.replace_snapshot(snapshot.clone()).await;

    assert!(!rx.has_changed().unwrap());
    assert_eq!(engine.visible_queue(), snapshot);
    assert_eq!(engine.metrics().await.snapshots_applied, 1);
}

#[tokio::test]
async fn test_load_queue_falls_back_to_cache() {
    let api = Arc::new(FakeApi::new());
    api.set_queue(pending_queue(2));
    let engine = engine_with(api.clone(), ConnectivityState::Online).await;

    assert_eq!(engine.load_queue().await, QueueSource::Server);
    assert_eq!(engine.visible_queue().len(), 2);

    api.set_queue_unreachable(true);
    assert_eq!(engine.load_queue().await, QueueSource::Cache);
    assert_eq!(engine.visible_queue().len(), 2);

    engine.monitor().set_state(ConnectivityState::Offline);
    assert_eq!(engine.load_queue().await, QueueSource::Cache);
    // offline loads never reach the server
    assert_eq!(api.queue_fetches(), 2);
}

#[tokio::test]
async fn test_snapshot_keeps_pending_overlay() {
    let api = Arc::new(FakeApi::new());
    let engine = engine_with(api, ConnectivityState::Offline).await;
    engine.replace_snapshot(pending_queue(2)).await;
    engine
        .request_status_change(&"r1".into(), relief_sync::shared::RequestStatus::Delivered)
        .await
        .unwrap();

    // the server has not seen the change yet
    engine.replace_snapshot(pending_queue(3)).await;

    let visible = engine.visible_queue();
    assert_eq!(visible.len(), 3);
    assert_eq!(visible[1].status, relief_sync::shared::RequestStatus::Delivered);
    assert_eq!(visible[2].status, relief_sync::shared::RequestStatus::Pending);
}
