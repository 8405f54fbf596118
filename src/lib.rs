//! Relief Sync - Main Library
//!
//! Offline-resilient synchronization for a volunteer's view of an aid request
//! priority queue. The server owns the queue; this crate keeps a local copy
//! that survives network loss, lets the volunteer change request statuses
//! while offline, and replays those changes in order once the network is back.
//!
//! # Module Structure
//!
//! - **`shared`** - Wire types mirroring the server
//!   - Request records and statuses, push events
//!   - Error taxonomy
//!   - Application configuration
//!
//! - **`client`** - Stateful components
//!   - REST client and Server-Sent Events channel
//!   - SQLite local store with in-memory fallback
//!   - Pending mutation queue and view reconciliation
//!   - The synchronization engine and its background tasks
//!
//! # Usage
//!
//! ```rust,no_run
//! use relief_sync::client::{Config, EventChannel, HttpApiClient, NetworkMonitor, SyncEngine};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::new();
//! let api = Arc::new(HttpApiClient::new(config.clone())?);
//! let engine = SyncEngine::init(config.app(), api, NetworkMonitor::default()).await;
//!
//! let channel = EventChannel::new(
//!     config.events_url(),
//!     config.get_token().map(str::to_string),
//!     config.app().reconnect.clone(),
//! )?;
//! engine.start(&channel);
//!
//! for record in engine.visible_queue() {
//!     println!("{} {}", record.id, record.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - **Engine**: cheap to clone, all state behind `Arc` and tokio locks
//! - **Notifications**: `watch` channels for the visible lists, `broadcast`
//!   for engine notices
//!
//! # Error Handling
//!
//! - `SyncError` for everything the engine returns
//! - `RemoteError` for REST and channel failures
//! - `StoreError` inside the local store, folded into `SyncError`

/// Shared types and data structures
pub mod shared;

/// Engine, store and network clients
pub mod client;
