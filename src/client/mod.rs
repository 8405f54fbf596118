//! Client Module
//!
//! The stateful side of the crate: everything that talks to the server or
//! to the local store, and the synchronization engine tying them together.
//!
//! # Architecture
//!
//! - **`config`** - Server URL, token and local store location
//! - **`api_client`** - REST calls behind the `RemoteApi` trait
//! - **`event_channel`** - Server-Sent Events push channel with reconnect
//! - **`local_db`** - SQLite store for the cached queue and pending changes
//! - **`offline`** - Store degradation, pending queue, cache and view reducer
//! - **`sync`** - The engine, connectivity monitor and background tasks
//! - **`main`** - Headless agent entry point (binary)
//!
//! # Module Structure
//!
//! ```text
//! client/
//! ├── mod.rs           - Module exports and documentation
//! ├── main.rs          - relief-sync-agent binary
//! ├── config.rs        - Configuration management
//! ├── api_client.rs    - REST client
//! ├── event_channel.rs - Push channel
//! ├── local_db/        - SQLite persistence
//! ├── offline/         - Offline support
//! └── sync/            - Synchronization engine
//! ```

pub mod api_client;
pub mod config;
pub mod event_channel;
pub mod local_db;
pub mod offline;
pub mod sync;

// Re-export commonly used types
pub use api_client::{HttpApiClient, RemoteApi};
pub use config::Config;
pub use event_channel::{ChannelStatus, EventChannel};
pub use offline::{OfflineStore, StoreMode};
pub use sync::{EngineNotice, NetworkMonitor, SyncEngine, SyncOutcome};
