//! Effective status overlay against a model

use chrono::Utc;
use proptest::prelude::*;
use std::collections::HashMap;

use relief_sync::client::offline::queue::PendingMutation;
use relief_sync::client::offline::reconciliation::{reduce, QueueView, ViewEvent};
use relief_sync::shared::{RequestRecord, RequestStatus};

use super::any_status;

fn mutation(id: i64, record: usize, status: RequestStatus) -> PendingMutation {
    PendingMutation {
        id,
        request_id: format!("r{}", record).as_str().into(),
        new_status: status,
        idempotency_key: uuid::Uuid::new_v4(),
        timestamp: Utc::now(),
    }
}

proptest! {
    #[test]
    fn test_newest_pending_status_wins(
        cached in prop::collection::vec(any_status(), 1..8),
        changes in prop::collection::vec((0usize..8, any_status()), 0..16),
    ) {
        let snapshot: Vec<_> = cached
            .iter()
            .enumerate()
            .map(|(i, status)| RequestRecord::new(format!("r{}", i).as_str(), *status))
            .collect();

        let mut view = reduce(QueueView::default(), ViewEvent::SnapshotReplaced(snapshot.clone()));
        let mut latest = HashMap::new();
        for (n, (record, status)) in changes.iter().enumerate() {
            view = reduce(view, ViewEvent::MutationQueued(mutation(n as i64 + 1, *record, *status)));
            latest.insert(format!("r{}", record), *status);
        }

        let visible = view.visible();
        prop_assert_eq!(visible.len(), snapshot.len());
        for (shown, cached) in visible.iter().zip(&snapshot) {
            prop_assert_eq!(&shown.id, &cached.id);
            let expected = latest.get(cached.id.as_str()).copied().unwrap_or(cached.status);
            prop_assert_eq!(shown.status, expected);
        }

        // acknowledging everything without confirmation falls back to the cache
        for n in 0..changes.len() {
            view = reduce(view, ViewEvent::MutationAcknowledged(n as i64 + 1));
        }
        prop_assert_eq!(view.visible(), snapshot);
    }
}
