//! # Pending Mutation Queue
//!
//! Durable FIFO log of status changes taken while the server was unreachable.
//!
//! ## Features
//!
//! - **Persistent Queue**: mutations survive app restarts
//! - **Creation Order**: ids increase monotonically and define replay order
//! - **No Coalescing**: two changes to the same record stay two entries
//! - **Idempotent Removal**: removing an unknown id is not an error
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relief_sync::client::offline::{OfflineStore, PendingMutationQueue};
//! use relief_sync::shared::{RequestId, RequestStatus};
//!
//! # async fn example(store: OfflineStore) -> Result<(), relief_sync::shared::SyncError> {
//! let queue = PendingMutationQueue::new(store);
//!
//! let mutation = queue.enqueue(&RequestId::new("r1"), RequestStatus::Delivered).await?;
//!
//! for pending in queue.list_all().await? {
//!     // submit to the server...
//!     queue.remove(pending.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::offline::OfflineStore;
use crate::shared::error::SyncError;
use crate::shared::{RequestId, RequestStatus};

pub use crate::client::local_db::pending::PendingMutation;

/// Pending mutation queue backed by the local store
#[derive(Debug, Clone)]
pub struct PendingMutationQueue {
    store: OfflineStore,
}

impl PendingMutationQueue {
    /// Create a queue on top of a store handle
    pub fn new(store: OfflineStore) -> Self {
        Self { store }
    }

    /// Append a mutation with a fresh id and the current timestamp
    pub async fn enqueue(
        &self,
        request_id: &RequestId,
        new_status: RequestStatus,
    ) -> Result<PendingMutation, SyncError> {
        let mutation = self
            .store
            .run(|db| async move { db.append_pending(request_id, new_status).await })
            .await?;

        tracing::debug!(
            id = mutation.id,
            request_id = %mutation.request_id,
            status = %mutation.new_status,
            "queued status change"
        );
        Ok(mutation)
    }

    /// Every mutation in creation order
    pub async fn list_all(&self) -> Result<Vec<PendingMutation>, SyncError> {
        self.store.run(|db| async move { db.pending_updates().await }).await
    }

    /// Remove a mutation; unknown ids are ignored
    pub async fn remove(&self, mutation_id: i64) -> Result<(), SyncError> {
        self.store
            .run(|db| async move { db.delete_pending(mutation_id).await })
            .await
    }

    /// Administrative purge; returns how many mutations were dropped
    pub async fn clear_all(&self) -> Result<u64, SyncError> {
        let dropped = self.store.run(|db| async move { db.clear_pending().await }).await?;
        if dropped > 0 {
            tracing::warn!(dropped, "purged pending status changes");
        }
        Ok(dropped)
    }

    /// Number of queued mutations
    pub async fn len(&self) -> Result<u64, SyncError> {
        self.store.run(|db| async move { db.pending_count().await }).await
    }

    /// Whether nothing is queued
    pub async fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(self.len().await? == 0)
    }
}
