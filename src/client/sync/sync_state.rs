//! # Sync State Management
//!
//! Result and status types exposed by the synchronization engine.
//!
//! ## Features
//!
//! - **Drain Outcome**: `{synced, failed}` counts of one drain pass
//! - **Action Outcome**: whether a status change went out or was queued
//! - **Engine Notices**: broadcast of everything a host may want to surface
//! - **Status Snapshot**: one struct summarizing the engine for display

use serde::Serialize;

use crate::client::event_channel::ChannelStatus;
use crate::client::offline::StoreMode;
use crate::client::sync::network_monitor::ConnectivityState;
use crate::shared::{RequestId, RequestStatus};

/// Counts reported by one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Mutations the server acknowledged and that were removed
    pub synced: u32,
    /// Mutations that failed and stay queued
    pub failed: u32,
}

impl SyncOutcome {
    /// Nothing was attempted
    pub fn is_noop(&self) -> bool {
        self.synced == 0 && self.failed == 0
    }
}

/// How a status change request was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChangeOutcome {
    /// The server accepted it directly
    Applied,
    /// Stored locally for the next drain
    Queued {
        /// Id of the pending mutation
        mutation_id: i64,
    },
}

/// Where the visible queue was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueSource {
    /// Fresh snapshot from the server
    Server,
    /// Last cached snapshot
    Cache,
}

/// Where a backwards status change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegressionSource {
    /// A `status_updated` push event
    Push,
    /// A full queue snapshot
    Snapshot,
    /// The server's answer to one of our own status changes
    LocalConfirmation,
}

impl std::fmt::Display for RegressionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RegressionSource::Push => "push",
            RegressionSource::Snapshot => "snapshot",
            RegressionSource::LocalConfirmation => "local confirmation",
        };
        f.write_str(name)
    }
}

/// Notification emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotice {
    /// Connectivity changed
    Connectivity(ConnectivityState),
    /// A drain pass finished
    DrainFinished(SyncOutcome),
    /// A new request entered the system
    NewRequest {
        /// Requester name, when the server included it
        name: Option<String>,
    },
    /// A request was dequeued and assigned
    RequestDequeued {
        /// Volunteer it went to
        assigned_to: String,
    },
    /// Advisory message from the server
    HighPriorityAlert(String),
    /// The server reported a status that moves a delivered record backwards
    Inconsistency {
        request_id: RequestId,
        cached: RequestStatus,
        reported: RequestStatus,
        source: RegressionSource,
    },
    /// The real-time channel changed state
    Channel(ChannelStatus),
    /// The local store stopped working; the engine is memory-only now
    StorageDegraded(String),
}

/// Summary of the engine for display
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub connectivity: ConnectivityState,
    pub store: StoreMode,
    pub channel: ChannelStatus,
    pub is_draining: bool,
    pub pending_mutations: usize,
    pub visible_records: usize,
    pub last_drain: Option<SyncOutcome>,
    pub last_drain_at: Option<chrono::DateTime<chrono::Utc>>,
}
