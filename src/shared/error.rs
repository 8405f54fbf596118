//! Shared Error Types
//!
//! This module defines the error taxonomy of the synchronization engine.
//!
//! # Error Categories
//!
//! - `SharedError` - validation and serialization failures on wire types
//! - `RemoteError` - a single remote call failed (transport or server side)
//! - `SyncError` - what engine callers see:
//!   - `StorageUnavailable` - the local store could not be opened or failed;
//!     the engine degrades to memory-only and has no offline durability
//!   - `NetworkUnreachable` - the monitor reports offline
//!   - `RemoteCallFailed` - reachable per monitor but the call itself failed
//!   - `ChannelDisconnected` - the push channel is down
//!   - `InvalidTransition` - a local change would move a delivered request back
//!
//! # Usage
//!
//! ```rust
//! use relief_sync::shared::error::{RemoteError, SyncError};
//!
//! let error: SyncError = RemoteError::Timeout.into();
//! assert!(error.is_remote());
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be moved across tasks.
use thiserror::Error;

use crate::shared::request::{RequestId, RequestStatus};

/// Validation and serialization errors on shared wire types
#[derive(Debug, Error, Clone)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

/// Failure of one remote call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request never reached the server
    #[error("Network error: {0}")]
    Network(String),

    /// The transport gave up waiting for a response
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a non-success status
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Message from the response body, or the status text
        message: String,
    },

    /// The response body did not have the expected shape
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the failure suggests the server is (temporarily) unreachable
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout)
    }
}

/// Errors surfaced by the synchronization engine
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// Local persistent store cannot be used
    #[error("Local storage unavailable: {reason}")]
    StorageUnavailable {
        /// Why the store is unavailable
        reason: String,
    },

    /// The network monitor reports the device as offline
    #[error("Network unreachable")]
    NetworkUnreachable,

    /// Reachable, but the remote call failed
    #[error("Remote call failed: {0}")]
    RemoteCallFailed(#[from] RemoteError),

    /// The real-time channel is down
    #[error("Event channel disconnected")]
    ChannelDisconnected,

    /// A persisted or received value could not be (de)serialized
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// The requested status would move a delivered request backwards
    #[error("Cannot move request {request_id} from {current} to {requested}")]
    InvalidTransition {
        request_id: RequestId,
        /// Confirmed or queued status blocking the change
        current: RequestStatus,
        requested: RequestStatus,
    },
}

impl SyncError {
    /// Create a storage unavailable error
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            reason: reason.into(),
        }
    }

    /// Whether this error came from a remote call
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::RemoteCallFailed(_))
    }
}

impl From<SharedError> for SyncError {
    fn from(err: SharedError) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
