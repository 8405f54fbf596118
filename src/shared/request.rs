/**
 * Aid Request Records
 *
 * This module defines the server-owned aid request record that the client
 * caches locally, together with its lifecycle status.
 *
 * Records are owned by the server. The client keeps a read-optimized replica
 * and never invents records on its own; the only local change it can make is
 * a status transition, which travels through the pending mutation queue.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::shared::error::SharedError;

/// Opaque server identity of an aid request
///
/// The server uses document ids (`_id` on the wire); the client never
/// interprets them beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap a raw server id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Delivery status of an aid request
///
/// Statuses only move forward: `Pending -> InTransit -> Delivered`.
/// `Delivered` is terminal.
///
/// # Example
/// ```rust
/// use relief_sync::shared::RequestStatus;
///
/// assert!(RequestStatus::Delivered.is_terminal());
/// assert!(RequestStatus::InTransit.is_regression_from(RequestStatus::Delivered));
/// assert_eq!(RequestStatus::InTransit.as_str(), "IN_TRANSIT");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Waiting in the priority queue
    Pending,
    /// Picked up by a volunteer and on its way
    InTransit,
    /// Delivered to the requester
    Delivered,
}

impl RequestStatus {
    /// Position of the status in the forward-only lifecycle
    pub fn rank(self) -> u8 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::InTransit => 1,
            RequestStatus::Delivered => 2,
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Delivered)
    }

    /// Whether moving from `current` to `self` would leave a terminal state
    pub fn is_regression_from(self, current: RequestStatus) -> bool {
        current.is_terminal() && self.rank() < current.rank()
    }

    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::InTransit => "IN_TRANSIT",
            RequestStatus::Delivered => "DELIVERED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RequestStatus::Pending),
            "IN_TRANSIT" => Ok(RequestStatus::InTransit),
            "DELIVERED" => Ok(RequestStatus::Delivered),
            other => Err(SharedError::validation(
                "status",
                format!("unknown request status '{}'", other),
            )),
        }
    }
}

/// Volunteer a request is assigned to
///
/// The server sends either a populated volunteer document or just the
/// volunteer id, depending on the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssignedTo {
    /// Populated volunteer reference
    Volunteer {
        /// Volunteer identity
        #[serde(rename = "_id")]
        id: String,
        /// Display name, when populated
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Bare volunteer id
    Id(String),
}

impl AssignedTo {
    /// Volunteer identity
    pub fn id(&self) -> &str {
        match self {
            AssignedTo::Volunteer { id, .. } => id,
            AssignedTo::Id(id) => id,
        }
    }

    /// Display name if the server populated it
    pub fn display_name(&self) -> Option<&str> {
        match self {
            AssignedTo::Volunteer { name, .. } => name.as_deref(),
            AssignedTo::Id(_) => None,
        }
    }
}

/// Aid request as last known from the server
///
/// Display and priority fields (`name`, `aidType`, `location`, ...) are kept
/// as an opaque payload: the engine only reasons about identity, status and
/// assignment. `priority_score` is computed server-side and only displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    /// Server identity
    #[serde(rename = "_id", alias = "id")]
    pub id: RequestId,
    /// Current lifecycle status
    pub status: RequestStatus,
    /// Server-computed priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_score: Option<f64>,
    /// Assigned volunteer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<AssignedTo>,
    /// Creation time on the server
    pub created_at: DateTime<Utc>,
    /// Delivery time, once delivered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    /// Remaining fields, passed through untouched
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl RequestRecord {
    /// Create a bare record, mostly useful for tests and fixtures
    pub fn new(id: impl Into<RequestId>, status: RequestStatus) -> Self {
        Self {
            id: id.into(),
            status,
            priority_score: None,
            assigned_to: None,
            created_at: Utc::now(),
            delivered_at: None,
            payload: serde_json::Map::new(),
        }
    }

    /// Copy of this record with a different status
    pub fn with_status(&self, status: RequestStatus) -> Self {
        let mut record = self.clone();
        record.status = status;
        record
    }

    /// Look up a display field from the opaque payload
    pub fn display_field(&self, field: &str) -> Option<&serde_json::Value> {
        self.payload.get(field)
    }
}
