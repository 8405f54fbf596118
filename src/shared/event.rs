/**
 * Real-time Push Events
 *
 * This module defines the events the server pushes over the real-time
 * channel and how they are decoded from a `(name, JSON payload)` pair.
 *
 * Only `queueState`/`queueUpdated` (full snapshot) and `statusUpdated`
 * (single record) carry state. `newRequest` and `requestDequeued` are
 * informational: the receiver re-fetches instead of applying the payload.
 */
use serde::{Deserialize, Serialize};

use crate::shared::error::SharedError;
use crate::shared::request::{RequestId, RequestRecord, RequestStatus};

/// Names of the events delivered on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Full queue state, sent on connect
    QueueState,
    /// Full queue state after a change
    QueueUpdated,
    /// A new request entered the system
    NewRequest,
    /// A request left the queue and was assigned
    RequestDequeued,
    /// A single request changed status
    StatusUpdated,
    /// Advisory message for volunteers
    HighPriorityAlert,
}

impl EventName {
    /// All event names, in wire order
    pub const ALL: [EventName; 6] = [
        EventName::QueueState,
        EventName::QueueUpdated,
        EventName::NewRequest,
        EventName::RequestDequeued,
        EventName::StatusUpdated,
        EventName::HighPriorityAlert,
    ];

    /// Name used on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::QueueState => "queueState",
            EventName::QueueUpdated => "queueUpdated",
            EventName::NewRequest => "newRequest",
            EventName::RequestDequeued => "requestDequeued",
            EventName::StatusUpdated => "statusUpdated",
            EventName::HighPriorityAlert => "highPriorityAlert",
        }
    }

    /// Parse a wire name, `None` for events this client does not handle
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == name)
    }
}

/// Event pushed by the server
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Full replacement of the visible queue (`queueState`)
    QueueState {
        /// Complete queue in server order
        queue: Vec<RequestRecord>,
    },
    /// Full replacement of the visible queue (`queueUpdated`)
    QueueUpdated {
        /// Complete queue in server order
        queue: Vec<RequestRecord>,
    },
    /// A new record entered the system
    NewRequest {
        /// Raw request document, for display only
        request: serde_json::Value,
    },
    /// A record left the pending queue
    RequestDequeued {
        /// Raw request document, if the server sent one
        request: Option<serde_json::Value>,
        /// Display name or id of the volunteer it went to
        assigned_to: String,
    },
    /// A single record changed status
    StatusUpdated {
        /// Record whose status changed
        request_id: RequestId,
        /// Status confirmed by the server
        new_status: RequestStatus,
    },
    /// Out-of-band advisory
    HighPriorityAlert {
        /// Message to show
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct QueuePayload {
    queue: Vec<RequestRecord>,
}

#[derive(Debug, Deserialize)]
struct NewRequestPayload {
    request: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DequeuedPayload {
    #[serde(default)]
    request: Option<serde_json::Value>,
    #[serde(default)]
    assigned_to: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    request_id: RequestId,
    new_status: RequestStatus,
}

#[derive(Debug, Deserialize)]
struct AlertPayload {
    message: String,
}

impl PushEvent {
    /// Decode an event from its wire name and JSON payload
    ///
    /// Returns `Ok(None)` for event names this client does not know about.
    pub fn decode(name: &str, data: &str) -> Result<Option<Self>, SharedError> {
        let Some(name) = EventName::parse(name) else {
            return Ok(None);
        };

        let event = match name {
            EventName::QueueState => {
                let payload: QueuePayload = serde_json::from_str(data)?;
                PushEvent::QueueState {
                    queue: payload.queue,
                }
            }
            EventName::QueueUpdated => {
                let payload: QueuePayload = serde_json::from_str(data)?;
                PushEvent::QueueUpdated {
                    queue: payload.queue,
                }
            }
            EventName::NewRequest => {
                let payload: NewRequestPayload = serde_json::from_str(data)?;
                PushEvent::NewRequest {
                    request: payload.request,
                }
            }
            EventName::RequestDequeued => {
                let payload: DequeuedPayload = serde_json::from_str(data)?;
                PushEvent::RequestDequeued {
                    request: payload.request,
                    assigned_to: describe_assignee(payload.assigned_to),
                }
            }
            EventName::StatusUpdated => {
                let payload: StatusPayload = serde_json::from_str(data)?;
                PushEvent::StatusUpdated {
                    request_id: payload.request_id,
                    new_status: payload.new_status,
                }
            }
            EventName::HighPriorityAlert => {
                let payload: AlertPayload = serde_json::from_str(data)?;
                PushEvent::HighPriorityAlert {
                    message: payload.message,
                }
            }
        };

        Ok(Some(event))
    }

    /// Wire name of this event
    pub fn name(&self) -> EventName {
        match self {
            PushEvent::QueueState { .. } => EventName::QueueState,
            PushEvent::QueueUpdated { .. } => EventName::QueueUpdated,
            PushEvent::NewRequest { .. } => EventName::NewRequest,
            PushEvent::RequestDequeued { .. } => EventName::RequestDequeued,
            PushEvent::StatusUpdated { .. } => EventName::StatusUpdated,
            PushEvent::HighPriorityAlert { .. } => EventName::HighPriorityAlert,
        }
    }

    /// Full snapshot carried by this event, if any
    pub fn snapshot(&self) -> Option<&[RequestRecord]> {
        match self {
            PushEvent::QueueState { queue } | PushEvent::QueueUpdated { queue } => Some(queue),
            _ => None,
        }
    }
}

/// The server sends either a populated volunteer or a plain name/id
fn describe_assignee(value: Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(name)) => name,
        Some(serde_json::Value::Object(map)) => map
            .get("name")
            .or_else(|| map.get("_id"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown volunteer")
            .to_string(),
        _ => "unknown volunteer".to_string(),
    }
}
