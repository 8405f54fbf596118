//! # Synchronization Engine
//!
//! Keeps the volunteer's view of the aid request queue consistent while the
//! network comes and goes. The engine is the only component that knows about
//! all the others: the local store, the pending mutation queue, the network
//! monitor, the real-time event channel and the REST API.
//!
//! ## Architecture
//!
//! - **View**: a [`QueueView`] behind a lock, changed only through the pure
//!   reducer in `offline::reconciliation`
//! - **Notifications**: the visible queue and assigned list are published on
//!   `watch` channels; everything else goes out as [`EngineNotice`]s
//! - **Drain**: replays pending mutations in creation order, one pass at a time
//! - **Background**: push events, connectivity transitions and the periodic
//!   drain run as tasks started by [`SyncEngine::start`]
//!
//! ## Key Behaviors
//!
//! - Offline status changes are queued and shown immediately
//! - Online status changes go straight to the server; failures are returned,
//!   never queued
//! - Coming back online drains the queue, then re-fetches the queue and the
//!   assigned list
//! - A full snapshot from the server replaces the cached one atomically
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relief_sync::client::api_client::HttpApiClient;
//! use relief_sync::client::config::Config;
//! use relief_sync::client::sync::network_monitor::NetworkMonitor;
//! use relief_sync::client::sync::SyncEngine;
//! use relief_sync::shared::{RequestId, RequestStatus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), relief_sync::shared::SyncError> {
//! let config = Config::new();
//! let api = Arc::new(HttpApiClient::new(config.clone())?);
//! let engine = SyncEngine::init(config.app(), api, NetworkMonitor::default()).await;
//!
//! engine.load_queue().await;
//! engine
//!     .request_status_change(&RequestId::new("r1"), RequestStatus::InTransit)
//!     .await?;
//!
//! let outcome = engine.trigger_drain().await;
//! println!("synced {} failed {}", outcome.synced, outcome.failed);
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod metrics;
pub mod network_monitor;
pub mod sync_state;

pub use metrics::SyncMetrics;
pub use network_monitor::{ConnectivityState, NetworkMonitor, ReachabilityProbe, TransitionSubscription};
pub use sync_state::{EngineNotice, QueueSource, RegressionSource, StatusChangeOutcome, SyncOutcome, SyncState};

use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use uuid::Uuid;

use crate::client::api_client::RemoteApi;
use crate::client::event_channel::ChannelStatus;
use crate::client::offline::queue::PendingMutation;
use crate::client::offline::reconciliation::{reduce, snapshot_regressions};
use crate::client::offline::{
    OfflineStore, PendingMutationQueue, QueueView, SnapshotCache, StatusCheck, StoreMode, ViewEvent,
};
use crate::shared::config::AppConfig;
use crate::shared::error::SyncError;
use crate::shared::{PushEvent, RequestId, RequestRecord, RequestStatus};

use background::Background;

/// Capacity of the notice broadcast; slow receivers miss the oldest notices
const NOTICE_CAPACITY: usize = 64;

/// Local synchronization engine
///
/// Cheap to clone; clones drive the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    api: Arc<dyn RemoteApi>,
    monitor: NetworkMonitor,
    store: OfflineStore,
    queue: PendingMutationQueue,
    cache: SnapshotCache,
    view: RwLock<QueueView>,
    visible: watch::Sender<Vec<RequestRecord>>,
    assigned: watch::Sender<Vec<RequestRecord>>,
    channel_status: watch::Sender<ChannelStatus>,
    notices: broadcast::Sender<EngineNotice>,
    drain_lock: Mutex<()>,
    draining: AtomicBool,
    degraded_reported: AtomicBool,
    metrics: RwLock<SyncMetrics>,
    drain_interval: Option<Duration>,
    background: std::sync::Mutex<Background>,
}

impl SyncEngine {
    /// Open the local store named by `config` and load the cached state
    ///
    /// Never fails: an unusable store degrades to memory-only.
    pub async fn init(config: &AppConfig, api: Arc<dyn RemoteApi>, monitor: NetworkMonitor) -> Self {
        let store = OfflineStore::open_or_degrade(config.database_path.as_deref()).await;
        Self::with_store(store, api, monitor, config.drain_interval).await
    }

    /// Build an engine on an already opened store
    pub async fn with_store(
        store: OfflineStore,
        api: Arc<dyn RemoteApi>,
        monitor: NetworkMonitor,
        drain_interval: Option<Duration>,
    ) -> Self {
        let cache = SnapshotCache::new(store.clone());
        let queue = PendingMutationQueue::new(store.clone());

        let snapshot = cache.load().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "no cached queue available");
            Vec::new()
        });
        let assigned = cache.load_assigned().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "no cached assigned requests available");
            Vec::new()
        });
        let pending = queue.list_all().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pending status changes unavailable");
            Vec::new()
        });

        let view = QueueView {
            snapshot,
            assigned,
            pending,
        };
        let (visible, _) = watch::channel(view.visible());
        let (assigned_tx, _) = watch::channel(view.visible_assigned());
        let (channel_status, _) = watch::channel(ChannelStatus::Idle);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        tracing::info!(
            cached = view.snapshot.len(),
            assigned = view.assigned.len(),
            pending = view.pending.len(),
            store = ?store.mode(),
            "sync engine initialized"
        );

        Self {
            inner: Arc::new(EngineInner {
                api,
                monitor,
                store,
                queue,
                cache,
                view: RwLock::new(view),
                visible,
                assigned: assigned_tx,
                channel_status,
                notices,
                drain_lock: Mutex::new(()),
                draining: AtomicBool::new(false),
                degraded_reported: AtomicBool::new(false),
                metrics: RwLock::new(SyncMetrics::new()),
                drain_interval,
                background: std::sync::Mutex::new(Background::default()),
            }),
        }
    }

    /// Network monitor driving the engine
    pub fn monitor(&self) -> &NetworkMonitor {
        &self.inner.monitor
    }

    /// Current durability of the local store
    pub fn store_mode(&self) -> StoreMode {
        self.inner.store.mode()
    }

    // ---- visible state ----

    /// Queue as it should be shown: cached snapshot plus unacknowledged changes
    pub fn visible_queue(&self) -> Vec<RequestRecord> {
        self.inner.visible.borrow().clone()
    }

    /// Receive the visible queue whenever it changes
    pub fn subscribe_visible(&self) -> watch::Receiver<Vec<RequestRecord>> {
        self.inner.visible.subscribe()
    }

    /// Assigned requests as they should be shown
    pub fn assigned_requests(&self) -> Vec<RequestRecord> {
        self.inner.assigned.borrow().clone()
    }

    /// Receive the assigned list whenever it changes
    pub fn subscribe_assigned(&self) -> watch::Receiver<Vec<RequestRecord>> {
        self.inner.assigned.subscribe()
    }

    /// Receive engine notices
    pub fn notices(&self) -> broadcast::Receiver<EngineNotice> {
        self.inner.notices.subscribe()
    }

    /// Effective status of one record
    pub async fn effective_status(&self, id: &RequestId) -> Option<RequestStatus> {
        self.inner.view.read().await.effective_status(id)
    }

    /// Unacknowledged local mutations, in creation order
    pub async fn pending_mutations(&self) -> Vec<PendingMutation> {
        self.inner.view.read().await.pending.clone()
    }

    // ---- snapshots ----

    /// Replace the cached queue with a full authoritative snapshot
    ///
    /// Replaying an identical snapshot changes nothing and notifies nobody.
    pub async fn replace_snapshot(&self, records: Vec<RequestRecord>) {
        let mut view = self.inner.view.write().await;
        if view.snapshot == records {
            tracing::debug!(count = records.len(), "snapshot unchanged");
            return;
        }

        // snapshots stay total; regressions are only reported
        for regression in snapshot_regressions(&view.snapshot, &records) {
            self.report_inconsistency(
                regression.request_id,
                regression.previous,
                regression.reported,
                RegressionSource::Snapshot,
            )
            .await;
        }

        if let Err(e) = self.inner.cache.replace(&records).await {
            self.note_storage_error(&e);
        }

        self.apply_locked(&mut view, ViewEvent::SnapshotReplaced(records));
        self.inner.metrics.write().await.record_snapshot();
    }

    /// Load the queue from the server, falling back to the cache
    pub async fn load_queue(&self) -> QueueSource {
        if self.inner.monitor.is_reachable() {
            match self.inner.api.fetch_queue_snapshot().await {
                Ok(records) => {
                    self.replace_snapshot(records).await;
                    return QueueSource::Server;
                }
                Err(e) => tracing::warn!(error = %e, "queue fetch failed, showing cached queue"),
            }
        }
        QueueSource::Cache
    }

    /// Load the volunteer's assigned requests, falling back to the cache
    pub async fn refresh_assigned(&self) -> QueueSource {
        if !self.inner.monitor.is_reachable() {
            return QueueSource::Cache;
        }

        let records = match self.inner.api.fetch_assigned_requests().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "assigned requests fetch failed, showing cached list");
                return QueueSource::Cache;
            }
        };

        let mut view = self.inner.view.write().await;
        if view.assigned != records {
            if let Err(e) = self.inner.cache.replace_assigned(&records).await {
                self.note_storage_error(&e);
            }
            self.apply_locked(&mut view, ViewEvent::AssignedReplaced(records));
        }
        QueueSource::Server
    }

    // ---- actions ----

    /// Change the status of a request
    ///
    /// Offline, the change is queued and shown right away. Online, it is sent
    /// directly and a failure is returned to the caller. Moving a delivered
    /// request backwards is rejected before anything is queued or sent.
    pub async fn request_status_change(
        &self,
        request_id: &RequestId,
        new_status: RequestStatus,
    ) -> Result<StatusChangeOutcome, SyncError> {
        if !self.inner.monitor.is_reachable() {
            // enqueue under the view lock so a concurrent drain cannot
            // acknowledge the mutation before it is in the view
            let mut view = self.inner.view.write().await;
            Self::check_transition(&view, request_id, new_status)?;
            let mutation = self
                .inner
                .queue
                .enqueue(request_id, new_status)
                .await
                .inspect_err(|e| self.note_storage_error(e))?;

            let mutation_id = mutation.id;
            tracing::info!(%request_id, status = %new_status, mutation_id, "offline, status change queued");
            self.apply_locked(&mut view, ViewEvent::MutationQueued(mutation));
            return Ok(StatusChangeOutcome::Queued { mutation_id });
        }

        Self::check_transition(&*self.inner.view.read().await, request_id, new_status)?;

        self.inner
            .api
            .submit_status_update(request_id, new_status, Uuid::new_v4())
            .await?;

        let mut view = self.inner.view.write().await;
        self.confirm_locked(&mut view, request_id, new_status, RegressionSource::LocalConfirmation)
            .await;
        Ok(StatusChangeOutcome::Applied)
    }

    /// Take the highest-priority request off the server queue
    pub async fn dequeue_next(&self) -> Result<Option<RequestRecord>, SyncError> {
        if !self.inner.monitor.is_reachable() {
            return Err(SyncError::NetworkUnreachable);
        }

        let record = self.inner.api.dequeue_next().await?;
        self.load_queue().await;
        self.refresh_assigned().await;
        Ok(record)
    }

    // ---- push events ----

    /// Apply one event received on the real-time channel
    pub async fn handle_push(&self, event: PushEvent) {
        match event {
            PushEvent::QueueState { queue } | PushEvent::QueueUpdated { queue } => {
                self.replace_snapshot(queue).await;
            }
            PushEvent::NewRequest { request } => {
                let name = request
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                self.notify(EngineNotice::NewRequest { name });
                self.load_queue().await;
            }
            PushEvent::RequestDequeued { assigned_to, .. } => {
                self.notify(EngineNotice::RequestDequeued { assigned_to });
                self.load_queue().await;
                self.refresh_assigned().await;
            }
            PushEvent::StatusUpdated {
                request_id,
                new_status,
            } => {
                let mut view = self.inner.view.write().await;
                self.confirm_locked(&mut view, &request_id, new_status, RegressionSource::Push)
                    .await;
            }
            PushEvent::HighPriorityAlert { message } => {
                tracing::info!(%message, "high priority alert");
                self.notify(EngineNotice::HighPriorityAlert(message));
            }
        }
    }

    // ---- drain ----

    /// Replay pending mutations against the server in creation order
    ///
    /// Passes never overlap: a second call waits for the running pass and
    /// then works on whatever is still queued.
    pub async fn trigger_drain(&self) -> SyncOutcome {
        let _guard = self.inner.drain_lock.lock().await;

        if !self.inner.monitor.is_reachable() {
            tracing::debug!("offline, drain skipped");
            return SyncOutcome::default();
        }

        let pending = match self.inner.queue.list_all().await {
            Ok(pending) => pending,
            Err(e) => {
                self.note_storage_error(&e);
                return SyncOutcome::default();
            }
        };
        if pending.is_empty() {
            return SyncOutcome::default();
        }

        self.inner.draining.store(true, Ordering::Release);
        let started = Instant::now();
        let mut outcome = SyncOutcome::default();

        for mutation in pending {
            let result = self
                .inner
                .api
                .submit_status_update(&mutation.request_id, mutation.new_status, mutation.idempotency_key)
                .await;

            match result {
                Ok(()) => {
                    if let Err(e) = self.inner.queue.remove(mutation.id).await {
                        self.note_storage_error(&e);
                    }
                    self.acknowledge(&mutation).await;
                    outcome.synced += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        mutation_id = mutation.id,
                        request_id = %mutation.request_id,
                        error = %e,
                        "pending status change failed, keeping it queued"
                    );
                    outcome.failed += 1;
                }
            }
        }

        self.inner.draining.store(false, Ordering::Release);
        self.inner.metrics.write().await.record_drain(outcome, started);
        tracing::info!(synced = outcome.synced, failed = outcome.failed, "drain finished");
        self.notify(EngineNotice::DrainFinished(outcome));
        outcome
    }

    /// Drain, then refresh the queue and assigned list whatever the outcome
    pub async fn sync_and_refresh(&self) -> SyncOutcome {
        let outcome = self.trigger_drain().await;
        self.load_queue().await;
        self.refresh_assigned().await;
        outcome
    }

    /// Drop every pending mutation without sending it
    pub async fn clear_pending(&self) -> Result<u64, SyncError> {
        let mut view = self.inner.view.write().await;
        let dropped = self
            .inner
            .queue
            .clear_all()
            .await
            .inspect_err(|e| self.note_storage_error(e))?;
        self.apply_locked(&mut view, ViewEvent::PendingReplaced(Vec::new()));
        Ok(dropped)
    }

    // ---- user data ----

    /// Store an opaque user data entry
    pub async fn save_user_data<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SyncError> {
        self.inner
            .store
            .put_user_data(key, value)
            .await
            .inspect_err(|e| self.note_storage_error(e))
    }

    /// Read an opaque user data entry
    pub async fn user_data<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SyncError> {
        self.inner
            .store
            .user_data(key)
            .await
            .inspect_err(|e| self.note_storage_error(e))
    }

    // ---- status ----

    /// Snapshot of the drain and snapshot counters
    pub async fn metrics(&self) -> SyncMetrics {
        self.inner.metrics.read().await.clone()
    }

    /// Summary for display
    pub async fn status(&self) -> SyncState {
        let (pending, visible) = {
            let view = self.inner.view.read().await;
            (view.pending.len(), view.snapshot.len())
        };
        let metrics = self.inner.metrics.read().await;

        SyncState {
            connectivity: self.inner.monitor.state(),
            store: self.inner.store.mode(),
            channel: self.inner.channel_status.borrow().clone(),
            is_draining: self.inner.draining.load(Ordering::Acquire),
            pending_mutations: pending,
            visible_records: visible,
            last_drain: metrics.last_outcome,
            last_drain_at: metrics.last_drain_at,
        }
    }

    // ---- internals ----

    fn apply_locked(&self, view: &mut QueueView, event: ViewEvent) {
        let current = std::mem::take(view);
        *view = reduce(current, event);
        self.publish(view);
    }

    fn publish(&self, view: &QueueView) {
        let visible = view.visible();
        self.inner.visible.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });

        let assigned = view.visible_assigned();
        self.inner.assigned.send_if_modified(|current| {
            if *current == assigned {
                false
            } else {
                *current = assigned;
                true
            }
        });
    }

    fn check_transition(view: &QueueView, request_id: &RequestId, new_status: RequestStatus) -> Result<(), SyncError> {
        match view.blocking_status(request_id, new_status) {
            Some(current) => {
                tracing::warn!(%request_id, current = %current, requested = %new_status, "status change rejected");
                Err(SyncError::InvalidTransition {
                    request_id: request_id.clone(),
                    current,
                    requested: new_status,
                })
            }
            None => Ok(()),
        }
    }

    /// Apply a server-confirmed status, unless it moves a delivered record back
    async fn confirm_locked(
        &self,
        view: &mut QueueView,
        request_id: &RequestId,
        new_status: RequestStatus,
        source: RegressionSource,
    ) {
        match view.check_status(request_id, new_status) {
            StatusCheck::Regression { current } => {
                self.report_inconsistency(request_id.clone(), current, new_status, source)
                    .await;
            }
            StatusCheck::Unknown => {
                tracing::debug!(%request_id, status = %new_status, "status update for a record not in view");
            }
            StatusCheck::Apply => {
                if let Err(e) = self.inner.cache.confirm_status(request_id, new_status).await {
                    self.note_storage_error(&e);
                }
                let in_assigned = view.assigned.iter().any(|r| &r.id == request_id);

                self.apply_locked(
                    view,
                    ViewEvent::StatusConfirmed {
                        request_id: request_id.clone(),
                        new_status,
                    },
                );

                if in_assigned {
                    if let Err(e) = self.inner.cache.replace_assigned(&view.assigned).await {
                        self.note_storage_error(&e);
                    }
                }
            }
        }
    }

    /// Confirm a drained mutation and drop it from the view
    async fn acknowledge(&self, mutation: &PendingMutation) {
        let mut view = self.inner.view.write().await;
        self.confirm_locked(
            &mut view,
            &mutation.request_id,
            mutation.new_status,
            RegressionSource::LocalConfirmation,
        )
        .await;
        self.apply_locked(&mut view, ViewEvent::MutationAcknowledged(mutation.id));
    }

    async fn report_inconsistency(
        &self,
        request_id: RequestId,
        cached: RequestStatus,
        reported: RequestStatus,
        source: RegressionSource,
    ) {
        match source {
            RegressionSource::LocalConfirmation => tracing::warn!(
                %request_id,
                cached = %cached,
                reported = %reported,
                "own status change would move a delivered request back, ignoring it"
            ),
            _ => tracing::warn!(
                %request_id,
                cached = %cached,
                reported = %reported,
                %source,
                "server reported a delivered request as not delivered"
            ),
        }
        self.inner.metrics.write().await.record_inconsistency();
        self.notify(EngineNotice::Inconsistency {
            request_id,
            cached,
            reported,
            source,
        });
    }

    fn note_storage_error(&self, error: &SyncError) {
        match error {
            SyncError::StorageUnavailable { reason } => {
                if !self.inner.degraded_reported.swap(true, Ordering::AcqRel) {
                    tracing::warn!(%reason, "local store failed, continuing memory-only");
                    self.notify(EngineNotice::StorageDegraded(reason.clone()));
                }
            }
            other => tracing::warn!(error = %other, "local store operation failed"),
        }
    }

    fn notify(&self, notice: EngineNotice) {
        // no receivers is fine
        let _ = self.inner.notices.send(notice);
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("connectivity", &self.inner.monitor.state())
            .field("store", &self.inner.store.mode())
            .finish_non_exhaustive()
    }
}
