//! # State Reconciliation
//!
//! Merges the server snapshot, confirmed status changes and unacknowledged
//! local mutations into the single view shown to the volunteer.
//!
//! ## Features
//!
//! - **Pure Reducer**: `reduce(view, event) -> view`, no I/O
//! - **Effective Status Overlay**: the newest pending mutation for a record
//!   wins over its cached status until the mutation is acknowledged
//! - **Regression Detection**: confirmed updates that would move a delivered
//!   record backwards are reported instead of applied
//!
//! ## Usage
//!
//! ```rust
//! use relief_sync::client::offline::reconciliation::{reduce, QueueView, ViewEvent};
//! use relief_sync::shared::{RequestRecord, RequestStatus};
//!
//! let view = reduce(
//!     QueueView::default(),
//!     ViewEvent::SnapshotReplaced(vec![RequestRecord::new("r1", RequestStatus::Pending)]),
//! );
//! assert_eq!(view.visible()[0].status, RequestStatus::Pending);
//! ```

use std::collections::HashMap;

use crate::client::offline::queue::PendingMutation;
use crate::shared::{RequestId, RequestRecord, RequestStatus};

/// Everything the visible state is computed from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueView {
    /// Last authoritative queue, in server order
    pub snapshot: Vec<RequestRecord>,
    /// The volunteer's assigned requests, in server order
    pub assigned: Vec<RequestRecord>,
    /// Unacknowledged local mutations, in creation order
    pub pending: Vec<PendingMutation>,
}

/// Inputs to the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// A full authoritative queue arrived
    SnapshotReplaced(Vec<RequestRecord>),
    /// A fresh assigned request list arrived
    AssignedReplaced(Vec<RequestRecord>),
    /// The server confirmed a single status change
    StatusConfirmed {
        /// Record that changed
        request_id: RequestId,
        /// Confirmed status
        new_status: RequestStatus,
    },
    /// A mutation was appended to the pending queue
    MutationQueued(PendingMutation),
    /// The server acknowledged a pending mutation
    MutationAcknowledged(i64),
    /// The pending queue was reloaded or purged
    PendingReplaced(Vec<PendingMutation>),
}

/// Outcome of checking a confirmed status change against the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheck {
    /// Safe to apply
    Apply,
    /// Record is not in the view
    Unknown,
    /// Would move a terminal record backwards
    Regression {
        /// Status currently cached
        current: RequestStatus,
    },
}

/// A record whose status went backwards between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regression {
    pub request_id: RequestId,
    pub previous: RequestStatus,
    pub reported: RequestStatus,
}

/// Apply one event to the view
pub fn reduce(mut view: QueueView, event: ViewEvent) -> QueueView {
    match event {
        ViewEvent::SnapshotReplaced(records) => {
            view.snapshot = records;
        }
        ViewEvent::AssignedReplaced(records) => {
            view.assigned = records;
        }
        ViewEvent::StatusConfirmed {
            request_id,
            new_status,
        } => {
            if let StatusCheck::Apply = view.check_status(&request_id, new_status) {
                for record in view
                    .snapshot
                    .iter_mut()
                    .chain(view.assigned.iter_mut())
                    .filter(|r| r.id == request_id)
                {
                    record.status = new_status;
                }
            }
        }
        ViewEvent::MutationQueued(mutation) => {
            view.pending.push(mutation);
        }
        ViewEvent::MutationAcknowledged(id) => {
            view.pending.retain(|m| m.id != id);
        }
        ViewEvent::PendingReplaced(pending) => {
            view.pending = pending;
        }
    }
    view
}

impl QueueView {
    /// Visible queue: snapshot with the effective status overlay
    pub fn visible(&self) -> Vec<RequestRecord> {
        apply_overlay(&self.snapshot, &self.pending)
    }

    /// Visible assigned list: assigned requests with the overlay
    pub fn visible_assigned(&self) -> Vec<RequestRecord> {
        apply_overlay(&self.assigned, &self.pending)
    }

    /// Effective status of one record, if it is in the view
    pub fn effective_status(&self, id: &RequestId) -> Option<RequestStatus> {
        if let Some(mutation) = self.pending.iter().rev().find(|m| &m.request_id == id) {
            return Some(mutation.new_status);
        }
        self.cached_status(id)
    }

    /// Status last confirmed by the server
    ///
    /// A record can sit in both the snapshot and the assigned list with
    /// different statuses when one of them is stale; the furthest one wins.
    pub fn cached_status(&self, id: &RequestId) -> Option<RequestStatus> {
        self.snapshot
            .iter()
            .chain(self.assigned.iter())
            .filter(|r| &r.id == id)
            .map(|r| r.status)
            .max_by_key(|status| status.rank())
    }

    /// Whether a confirmed status change can be applied
    pub fn check_status(&self, id: &RequestId, new_status: RequestStatus) -> StatusCheck {
        match self.cached_status(id) {
            None => StatusCheck::Unknown,
            Some(current) if new_status.is_regression_from(current) => {
                StatusCheck::Regression { current }
            }
            Some(_) => StatusCheck::Apply,
        }
    }

    /// Status that forbids a local change to `new_status`, if any
    ///
    /// Both the confirmed status and the newest pending change count: a
    /// queued DELIVERED will reach the server before anything queued after it.
    pub fn blocking_status(&self, id: &RequestId, new_status: RequestStatus) -> Option<RequestStatus> {
        self.cached_status(id)
            .into_iter()
            .chain(self.effective_status(id))
            .find(|current| new_status.is_regression_from(*current))
    }
}

/// Overlay the newest pending mutation per record onto `records`
pub fn apply_overlay(records: &[RequestRecord], pending: &[PendingMutation]) -> Vec<RequestRecord> {
    if pending.is_empty() {
        return records.to_vec();
    }

    // later mutations overwrite earlier ones
    let latest: HashMap<&RequestId, RequestStatus> = pending
        .iter()
        .map(|m| (&m.request_id, m.new_status))
        .collect();

    records
        .iter()
        .map(|record| match latest.get(&record.id) {
            Some(status) if *status != record.status => record.with_status(*status),
            _ => record.clone(),
        })
        .collect()
}

/// Records that were delivered in `previous` but are reported earlier in `next`
pub fn snapshot_regressions(previous: &[RequestRecord], next: &[RequestRecord]) -> Vec<Regression> {
    let before: HashMap<&RequestId, RequestStatus> =
        previous.iter().map(|r| (&r.id, r.status)).collect();

    next.iter()
        .filter_map(|record| {
            let previous = *before.get(&record.id)?;
            record.status.is_regression_from(previous).then(|| Regression {
                request_id: record.id.clone(),
                previous,
                reported: record.status,
            })
        })
        .collect()
}
