//! Snapshot cache
//!
//! Persists the last authoritative queue snapshot and the volunteer's
//! assigned request list so both can be shown while offline.

use crate::client::local_db::Collection;
use crate::client::offline::OfflineStore;
use crate::shared::error::SyncError;
use crate::shared::{RequestId, RequestRecord, RequestStatus};

/// User data key of the assigned request list
pub const ASSIGNED_REQUESTS_KEY: &str = "assignedRequests";

/// Cached server state
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    store: OfflineStore,
}

impl SnapshotCache {
    pub fn new(store: OfflineStore) -> Self {
        Self { store }
    }

    /// Replace the cached queue in one transaction
    pub async fn replace(&self, records: &[RequestRecord]) -> Result<(), SyncError> {
        self.store
            .run(|db| async move { db.replace_requests(records).await })
            .await
    }

    /// Cached queue in server order
    pub async fn load(&self) -> Result<Vec<RequestRecord>, SyncError> {
        self.store.run(|db| async move { db.cached_requests().await }).await
    }

    pub async fn record(&self, id: &RequestId) -> Result<Option<RequestRecord>, SyncError> {
        self.store
            .run(|db| async move { db.cached_request(id).await })
            .await
    }

    pub async fn by_status(&self, status: RequestStatus) -> Result<Vec<RequestRecord>, SyncError> {
        self.store
            .run(|db| async move { db.cached_requests_by_status(status).await })
            .await
    }

    /// Record a server-confirmed status change on the cached copy
    pub async fn confirm_status(&self, id: &RequestId, status: RequestStatus) -> Result<bool, SyncError> {
        self.store
            .run(|db| async move { db.update_cached_status(id, status).await })
            .await
    }

    /// Replace the cached assigned request list
    pub async fn replace_assigned(&self, records: &[RequestRecord]) -> Result<(), SyncError> {
        self.store.put_user_data(ASSIGNED_REQUESTS_KEY, &records).await
    }

    /// Cached assigned request list, empty when never fetched
    pub async fn load_assigned(&self) -> Result<Vec<RequestRecord>, SyncError> {
        Ok(self
            .store
            .user_data(ASSIGNED_REQUESTS_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Drop everything cached from the server
    pub async fn clear(&self) -> Result<(), SyncError> {
        self.store
            .run(|db| async move { db.clear(Collection::Requests).await })
            .await?;
        self.store.delete_user_data(ASSIGNED_REQUESTS_KEY).await
    }
}
