//! Shared Module
//!
//! This module contains the types that mirror the server's wire format:
//! aid request records, push events, the error taxonomy and the
//! application configuration.
//!
//! # Overview
//!
//! Everything in here is plain data. The stateful parts of the engine live
//! in [`crate::client`].

/// Aid request records and statuses
pub mod request;

/// Real-time push events
pub mod event;

/// Error taxonomy
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use request::{AssignedTo, RequestId, RequestRecord, RequestStatus};
pub use event::{EventName, PushEvent};
pub use error::{RemoteError, SharedError, SyncError};
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
