//! # Pending Update Log
//!
//! Durable, append-only log of status changes taken while offline.
//!
//! Row ids come from `AUTOINCREMENT`, so they increase monotonically and are
//! never reused, even after the highest row was deleted. Listing by id is
//! therefore listing in creation order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::client::local_db::{LocalDatabase, Result, StoreError};
use crate::shared::{RequestId, RequestStatus};

/// Locally originated status change awaiting server confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Local id, also the replay order
    pub id: i64,
    /// Record the change applies to
    pub request_id: RequestId,
    /// Requested status
    pub new_status: RequestStatus,
    /// Key sent with every replay so the server can drop duplicates
    pub idempotency_key: Uuid,
    /// When the change was taken (informational)
    pub timestamp: DateTime<Utc>,
}

impl PendingMutation {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let key: String = row.try_get("idempotency_key")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            request_id: RequestId::new(row.try_get::<String, _>("request_id")?),
            new_status: status.parse().map_err(corrupt)?,
            idempotency_key: Uuid::parse_str(&key).map_err(corrupt)?,
            timestamp: DateTime::parse_from_rfc3339(&created_at)
                .map_err(corrupt)?
                .with_timezone(&Utc),
        })
    }
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Sqlx(sqlx::Error::Decode(
        format!("corrupt pending update row: {}", err).into(),
    ))
}

impl LocalDatabase {
    /// Append a pending update and return it with its assigned id
    pub async fn append_pending(
        &self,
        request_id: &RequestId,
        new_status: RequestStatus,
    ) -> Result<PendingMutation> {
        let idempotency_key = Uuid::new_v4();
        let timestamp = Utc::now();

        let result = sqlx::query(
            "INSERT INTO pending_updates (request_id, status, idempotency_key, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(request_id.as_str())
        .bind(new_status.as_str())
        .bind(idempotency_key.to_string())
        .bind(timestamp.to_rfc3339())
        .execute(self.pool())
        .await?;

        Ok(PendingMutation {
            id: result.last_insert_rowid(),
            request_id: request_id.clone(),
            new_status,
            idempotency_key,
            timestamp,
        })
    }

    /// All pending updates in creation order
    pub async fn pending_updates(&self) -> Result<Vec<PendingMutation>> {
        let rows = sqlx::query(
            "SELECT id, request_id, status, idempotency_key, created_at
             FROM pending_updates ORDER BY id ASC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(PendingMutation::from_row).collect()
    }

    /// One pending update
    pub async fn pending_update(&self, id: i64) -> Result<Option<PendingMutation>> {
        let row = sqlx::query(
            "SELECT id, request_id, status, idempotency_key, created_at
             FROM pending_updates WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(PendingMutation::from_row).transpose()
    }

    /// Delete a pending update; deleting a missing id is a no-op
    pub async fn delete_pending(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pending_updates WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Delete every pending update
    pub async fn clear_pending(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_updates")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of pending updates
    pub async fn pending_count(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_updates")
            .fetch_one(self.pool())
            .await?;
        Ok(count.0 as u64)
    }
}
