//! # Offline Storage
//!
//! Provides the offline-first building blocks of the engine: a store handle
//! that degrades instead of crashing, the durable pending mutation queue, the
//! snapshot cache, and the pure reducer that computes what the user sees.
//!
//! ## Architecture
//!
//! - **Store Handle**: durable file → memory-only → unavailable
//! - **Mutation Queue**: FIFO log of status changes taken offline
//! - **Snapshot Cache**: last authoritative queue from the server
//! - **Reconciliation**: `(view, event) -> view` reducer with the status overlay
//! - **Retry Logic**: backoff policies for reconnects
//!
//! ## Key Components
//!
//! - `queue.rs`: Pending mutation queue
//! - `cache.rs`: Snapshot cache and assigned request list
//! - `reconciliation.rs`: View reducer and regression checks
//! - `retry.rs`: Retry logic and backoff strategies
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relief_sync::client::offline::{OfflineStore, PendingMutationQueue};
//! use relief_sync::shared::{RequestId, RequestStatus};
//!
//! # async fn example() -> Result<(), relief_sync::shared::SyncError> {
//! let store = OfflineStore::open_or_degrade(None).await;
//! let queue = PendingMutationQueue::new(store.clone());
//!
//! queue.enqueue(&RequestId::new("r1"), RequestStatus::InTransit).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod queue;
pub mod reconciliation;
pub mod retry;

pub use cache::SnapshotCache;
pub use queue::PendingMutationQueue;
pub use reconciliation::{QueueView, StatusCheck, ViewEvent};
pub use retry::{Backoff, BackoffStrategy, RetryPolicy};

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::client::local_db::{self, Collection, LocalDatabase};
use crate::shared::error::SyncError;

/// How much durability the store currently offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Backed by a file; survives restarts
    Durable,
    /// Backed by an in-memory database; lost on exit
    MemoryOnly,
    /// No store; reads are cache misses and enqueues fail
    Unavailable,
}

#[derive(Debug)]
struct StoreInner {
    db: Option<LocalDatabase>,
    failed: AtomicBool,
}

/// Shared handle to the local store
///
/// Any storage error after opening flips the handle to
/// [`StoreMode::Unavailable`] for the rest of the process.
#[derive(Debug, Clone)]
pub struct OfflineStore {
    inner: Arc<StoreInner>,
}

impl OfflineStore {
    /// Wrap an already opened database
    pub fn from_database(db: LocalDatabase) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                db: Some(db),
                failed: AtomicBool::new(false),
            }),
        }
    }

    /// A handle with no backing store
    pub fn unavailable() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                db: None,
                failed: AtomicBool::new(true),
            }),
        }
    }

    /// Open the store at `path` (or the platform default), degrading on failure
    pub async fn open_or_degrade(path: Option<&Path>) -> Self {
        let path: PathBuf = path
            .map(Path::to_path_buf)
            .unwrap_or_else(LocalDatabase::default_path);

        match LocalDatabase::open(&path).await {
            Ok(db) => {
                tracing::info!(path = %path.display(), "local store opened");
                return Self::from_database(db);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot open local store, falling back to memory-only");
            }
        }

        match LocalDatabase::in_memory().await {
            Ok(db) => Self::from_database(db),
            Err(e) => {
                tracing::warn!(error = %e, "memory-only store unavailable, running without local storage");
                Self::unavailable()
            }
        }
    }

    /// Current durability
    pub fn mode(&self) -> StoreMode {
        match &self.inner.db {
            Some(_) if self.inner.failed.load(Ordering::Acquire) => StoreMode::Unavailable,
            Some(db) if db.is_durable() => StoreMode::Durable,
            Some(_) => StoreMode::MemoryOnly,
            None => StoreMode::Unavailable,
        }
    }

    /// Whether operations will be attempted at all
    pub fn is_available(&self) -> bool {
        self.mode() != StoreMode::Unavailable
    }

    /// Stop using the store for the rest of the process
    pub fn mark_unavailable(&self, reason: &str) {
        if !self.inner.failed.swap(true, Ordering::AcqRel) {
            tracing::warn!(reason, "local store marked unavailable");
        }
    }

    /// Run one store operation
    ///
    /// Fails fast with `StorageUnavailable` once the store is unusable and
    /// marks it unusable on the first error.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, SyncError>
    where
        F: FnOnce(LocalDatabase) -> Fut,
        Fut: Future<Output = local_db::Result<T>>,
    {
        let db = match &self.inner.db {
            Some(db) if !self.inner.failed.load(Ordering::Acquire) => db.clone(),
            _ => return Err(SyncError::storage("local store is not available")),
        };

        op(db).await.map_err(|e| {
            self.mark_unavailable(&e.to_string());
            SyncError::from(e)
        })
    }

    /// Store one opaque user data entry
    pub async fn put_user_data<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SyncError> {
        let value = serde_json::to_value(value)?;
        self.run(|db| async move { db.put(Collection::UserData, key, &value).await })
            .await
    }

    /// Read one opaque user data entry
    pub async fn user_data<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SyncError> {
        let value: Option<serde_json::Value> = self
            .run(|db| async move { db.get(Collection::UserData, key).await })
            .await?;
        value
            .map(serde_json::from_value)
            .transpose()
            .map_err(SyncError::from)
    }

    /// Delete one user data entry
    pub async fn delete_user_data(&self, key: &str) -> Result<(), SyncError> {
        self.run(|db| async move { db.delete(Collection::UserData, key).await })
            .await
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        if let Some(db) = &self.inner.db {
            db.close().await;
        }
    }
}
