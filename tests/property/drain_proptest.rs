//! Drain ordering under arbitrary failures

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use relief_sync::client::sync::{ConnectivityState, SyncOutcome};
use relief_sync::shared::RequestStatus;

use super::any_status;
use crate::common::*;

/// Drop changes that would move a record out of DELIVERED; those are rejected
fn forward_only(changes: Vec<(u8, RequestStatus)>) -> Vec<(u8, RequestStatus)> {
    let mut delivered = HashSet::new();
    changes
        .into_iter()
        .filter(|(id, status)| {
            if delivered.contains(id) {
                return *status == RequestStatus::Delivered;
            }
            if *status == RequestStatus::Delivered {
                delivered.insert(*id);
            }
            true
        })
        .collect()
}

fn drain_case(changes: Vec<(u8, RequestStatus)>, failing: HashSet<u8>) -> Result<(), TestCaseError> {
    let changes = forward_only(changes);
    tokio_test::block_on(async move {
        let api = Arc::new(FakeApi::new());
        for id in &failing {
            api.fail_updates_for(&format!("r{}", id));
        }
        let engine = engine_with(api.clone(), ConnectivityState::Offline).await;

        for (id, status) in &changes {
            engine
                .request_status_change(&format!("r{}", id).as_str().into(), *status)
                .await
                .unwrap();
        }
        engine.monitor().set_state(ConnectivityState::Online);

        let outcome = engine.trigger_drain().await;

        let expected: Vec<_> = changes
            .iter()
            .map(|(id, status)| (format!("r{}", id), *status))
            .collect();
        prop_assert_eq!(api.submitted(), expected);

        let failed = changes.iter().filter(|(id, _)| failing.contains(id)).count() as u32;
        prop_assert_eq!(
            outcome,
            SyncOutcome {
                synced: changes.len() as u32 - failed,
                failed,
            }
        );

        let left: Vec<_> = engine
            .pending_mutations()
            .await
            .into_iter()
            .map(|m| (m.request_id.to_string(), m.new_status))
            .collect();
        let expected_left: Vec<_> = changes
            .iter()
            .filter(|(id, _)| failing.contains(id))
            .map(|(id, status)| (format!("r{}", id), *status))
            .collect();
        prop_assert_eq!(left, expected_left);
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_drain_submits_in_creation_order(
        changes in prop::collection::vec((0u8..5, any_status()), 0..12),
        failing in prop::collection::hash_set(0u8..5, 0..3),
    ) {
        drain_case(changes, failing)?;
    }
}
