//! # Sync Metrics
//!
//! Counters for drain passes, read through `SyncEngine::metrics()`.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::client::sync::sync_state::SyncOutcome;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncMetrics {
    pub total_drains: u64,
    pub total_synced: u64,
    pub total_failed: u64,
    pub last_outcome: Option<SyncOutcome>,
    pub last_drain_duration: Option<Duration>,
    pub last_drain_at: Option<DateTime<Utc>>,
    pub snapshots_applied: u64,
    pub inconsistencies: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished drain that started at `started`
    pub fn record_drain(&mut self, outcome: SyncOutcome, started: Instant) {
        self.total_drains += 1;
        self.total_synced += u64::from(outcome.synced);
        self.total_failed += u64::from(outcome.failed);
        self.last_outcome = Some(outcome);
        self.last_drain_duration = Some(started.elapsed());
        self.last_drain_at = Some(Utc::now());
    }

    pub fn record_snapshot(&mut self) {
        self.snapshots_applied += 1;
    }

    pub fn record_inconsistency(&mut self) {
        self.inconsistencies += 1;
    }

    /// Share of attempted mutations that synced
    pub fn success_rate(&self) -> f64 {
        let attempted = self.total_synced + self.total_failed;
        if attempted == 0 {
            0.0
        } else {
            self.total_synced as f64 / attempted as f64
        }
    }
}
