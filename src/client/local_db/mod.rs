//! # Local Database Module
//!
//! This module provides the local SQLite store that keeps the client usable
//! while offline. It survives process restarts and holds three independent
//! collections:
//!
//! - **Cached requests**: the last authoritative queue snapshot from the server
//! - **Pending updates**: locally originated status changes awaiting confirmation
//! - **User data**: small opaque JSON entries (assigned requests, preferences)
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, schema management and keyed collections
//! - `schema.rs`: schema versions and migration SQL
//! - `requests.rs`: snapshot replacement and cached record lookups
//! - `pending.rs`: the append-only pending update log
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relief_sync::client::local_db::{Collection, LocalDatabase};
//!
//! # async fn example() -> relief_sync::client::local_db::Result<()> {
//! let db = LocalDatabase::open(LocalDatabase::default_path()).await?;
//!
//! db.put(Collection::UserData, "lastTab", &"assigned").await?;
//! let tab: Option<String> = db.get(Collection::UserData, "lastTab").await?;
//! # Ok(())
//! # }
//! ```

pub mod schema;
pub mod requests;
pub mod pending;

use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Row, Sqlite, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::shared::error::SyncError;

/// Errors raised by the local store
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite or pool failure
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A stored value could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database directory could not be created
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::storage(err.to_string())
    }
}

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Keyed collections of the store
///
/// The pending update log is not keyed by the caller; it lives in
/// [`pending`] with its own append/remove operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Cached server snapshot, keyed by request id
    Requests,
    /// Opaque user data entries
    UserData,
}

impl Collection {
    fn table(self) -> &'static str {
        match self {
            Collection::Requests => "cached_requests",
            Collection::UserData => "user_data",
        }
    }
}

/// Local database connection manager
///
/// Cloning is cheap: clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
    durable: bool,
}

impl LocalDatabase {
    /// Open or create the on-disk database
    ///
    /// Creates the parent directory and the schema when missing. Uses WAL mode
    /// so readers never observe an uncommitted snapshot replacement.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool, durable: true };
        db.init_schema().await?;

        tracing::debug!(path = %path.display(), "opened local database");
        Ok(db)
    }

    /// Open a memory-only database
    ///
    /// Contents are lost when the process exits. A single connection is kept
    /// alive for the lifetime of the pool, since every SQLite connection to
    /// `:memory:` sees its own private database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            durable: false,
        };
        db.init_schema().await?;
        Ok(db)
    }

    /// Platform-specific location of the database file
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("relief-sync");
        path.push("local.db");
        path
    }

    /// Whether contents survive a restart
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction for multi-record writes
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Close all connections
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Initialize database schema
    ///
    /// Applies every migration newer than the recorded schema version.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        for version in schema::get_pending_migrations(current_version.0) {
            let Some(sql) = schema::migration_sql(version) else {
                continue;
            };

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(version, "applied local schema migration");
        }

        Ok(())
    }

    /// Insert or replace one entry of a keyed collection
    ///
    /// New keys are appended after the existing entries; replacing an
    /// existing key keeps its position.
    pub async fn put<T: Serialize>(&self, collection: Collection, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_string(value)?;
        let mut conn = self.pool.acquire().await?;
        put_row(&mut conn, collection, key, None, &value).await
    }

    /// Fetch one entry of a keyed collection
    pub async fn get<T: DeserializeOwned>(&self, collection: Collection, key: &str) -> Result<Option<T>> {
        let sql = format!("SELECT value FROM {} WHERE key = ?", collection.table());
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Fetch every entry of a keyed collection, in position order
    pub async fn get_all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT value FROM {} ORDER BY position ASC, key ASC",
            collection.table()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<T> {
                let raw: String = row.try_get("value")?;
                Ok(serde_json::from_str(&raw)?)
            })
            .collect()
    }

    /// Delete one entry; deleting a missing key is a no-op
    pub async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE key = ?", collection.table());
        sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    /// Remove every entry of a keyed collection
    pub async fn clear(&self, collection: Collection) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        clear_rows(&mut conn, collection).await
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let cached: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cached_requests")
            .fetch_one(&self.pool)
            .await?;
        let pending: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_updates")
            .fetch_one(&self.pool)
            .await?;
        let user_data: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_data")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            cached_requests: cached.0 as u64,
            pending_updates: pending.0 as u64,
            user_data_entries: user_data.0 as u64,
        })
    }
}

/// Insert or replace one row on an existing connection or transaction
///
/// `position` of `None` appends new keys and keeps the position of existing ones.
pub(crate) async fn put_row(
    conn: &mut SqliteConnection,
    collection: Collection,
    key: &str,
    position: Option<i64>,
    value: &str,
) -> Result<()> {
    let table = collection.table();
    let now = chrono::Utc::now().to_rfc3339();

    match position {
        Some(position) => {
            let sql = format!(
                "INSERT INTO {table} (key, position, value, updated_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                    position = excluded.position,
                    value = excluded.value,
                    updated_at = excluded.updated_at"
            );
            sqlx::query(&sql)
                .bind(key)
                .bind(position)
                .bind(value)
                .bind(&now)
                .execute(&mut *conn)
                .await?;
        }
        None => {
            let sql = format!(
                "INSERT INTO {table} (key, position, value, updated_at)
                 VALUES (?, (SELECT COALESCE(MAX(position) + 1, 0) FROM {table}), ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at"
            );
            sqlx::query(&sql)
                .bind(key)
                .bind(value)
                .bind(&now)
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(())
}

/// Remove every row of a collection on an existing connection or transaction
pub(crate) async fn clear_rows(conn: &mut SqliteConnection, collection: Collection) -> Result<()> {
    let sql = format!("DELETE FROM {}", collection.table());
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Records in the cached snapshot
    pub cached_requests: u64,
    /// Pending updates awaiting sync
    pub pending_updates: u64,
    /// User data entries
    pub user_data_entries: u64,
}
