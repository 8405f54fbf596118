//! Property-based tests for draining and the status overlay

mod drain_proptest;
mod overlay_proptest;

use proptest::prelude::*;
use relief_sync::shared::RequestStatus;

pub fn any_status() -> impl Strategy<Value = RequestStatus> {
    prop_oneof![
        Just(RequestStatus::Pending),
        Just(RequestStatus::InTransit),
        Just(RequestStatus::Delivered),
    ]
}
