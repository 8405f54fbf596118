//! Engine and record fixtures

use std::sync::Arc;
use std::time::Duration;

use relief_sync::client::local_db::LocalDatabase;
use relief_sync::client::offline::OfflineStore;
use relief_sync::client::sync::{ConnectivityState, NetworkMonitor, SyncEngine};
use relief_sync::shared::{RequestRecord, RequestStatus};

use super::FakeApi;

/// Engine over a fresh in-memory store
pub async fn engine_with(api: Arc<FakeApi>, state: ConnectivityState) -> SyncEngine {
    let db = LocalDatabase::in_memory()
        .await
        .expect("in-memory database");
    engine_on(OfflineStore::from_database(db), api, state).await
}

/// Engine over an existing store, e.g. a reopened file
pub async fn engine_on(store: OfflineStore, api: Arc<FakeApi>, state: ConnectivityState) -> SyncEngine {
    SyncEngine::with_store(store, api, NetworkMonitor::new(state), None).await
}

pub fn pending(id: &str) -> RequestRecord {
    RequestRecord::new(id, RequestStatus::Pending)
}

/// `count` pending records named `r0`, `r1`, ...
pub fn pending_queue(count: usize) -> Vec<RequestRecord> {
    (0..count).map(|i| pending(&format!("r{}", i))).collect()
}

pub fn ids(records: &[RequestRecord]) -> Vec<String> {
    records.iter().map(|r| r.id.to_string()).collect()
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
