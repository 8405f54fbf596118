//! # Cached Request Operations
//!
//! Snapshot replacement and lookups on the cached copy of the server queue.
//!
//! ## Features
//!
//! - **Atomic Replacement**: `DELETE` + bulk insert inside one transaction
//! - **Server Order**: records keep the position the server sent them in
//! - **Status Lookup**: filter the cached snapshot by status
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relief_sync::client::local_db::LocalDatabase;
//! use relief_sync::shared::{RequestRecord, RequestStatus};
//!
//! # async fn example(db: LocalDatabase) -> relief_sync::client::local_db::Result<()> {
//! db.replace_requests(&[RequestRecord::new("r1", RequestStatus::Pending)]).await?;
//!
//! let pending = db.cached_requests_by_status(RequestStatus::Pending).await?;
//! assert_eq!(pending.len(), 1);
//! # Ok(())
//! # }
//! ```

use sqlx::Row;

use crate::client::local_db::{clear_rows, put_row, Collection, LocalDatabase, Result};
use crate::shared::{RequestId, RequestRecord, RequestStatus};

impl LocalDatabase {
    /// Replace the cached snapshot with `records`
    ///
    /// Readers observe either the previous snapshot or the new one, never a
    /// mix. Duplicate ids keep the last occurrence.
    pub async fn replace_requests(&self, records: &[RequestRecord]) -> Result<()> {
        let mut tx = self.begin().await?;

        clear_rows(&mut *tx, Collection::Requests).await?;
        for (position, record) in records.iter().enumerate() {
            let value = serde_json::to_string(record)?;
            put_row(
                &mut *tx,
                Collection::Requests,
                record.id.as_str(),
                Some(position as i64),
                &value,
            )
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(count = records.len(), "replaced cached snapshot");
        Ok(())
    }

    /// Cached snapshot in server order
    pub async fn cached_requests(&self) -> Result<Vec<RequestRecord>> {
        self.get_all(Collection::Requests).await
    }

    /// Single cached record
    pub async fn cached_request(&self, id: &RequestId) -> Result<Option<RequestRecord>> {
        self.get(Collection::Requests, id.as_str()).await
    }

    /// Cached records with the given status, in server order
    pub async fn cached_requests_by_status(&self, status: RequestStatus) -> Result<Vec<RequestRecord>> {
        let rows = sqlx::query(
            "SELECT value FROM cached_requests
             WHERE json_extract(value, '$.status') = ?
             ORDER BY position ASC",
        )
        .bind(status.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<RequestRecord> {
                let raw: String = row.try_get("value")?;
                Ok(serde_json::from_str(&raw)?)
            })
            .collect()
    }

    /// Overwrite the status of one cached record
    ///
    /// Returns `false` when the record is not cached.
    pub async fn update_cached_status(&self, id: &RequestId, status: RequestStatus) -> Result<bool> {
        let Some(record) = self.cached_request(id).await? else {
            return Ok(false);
        };

        let value = serde_json::to_string(&record.with_status(status))?;
        let mut conn = self.pool().acquire().await?;
        put_row(&mut conn, Collection::Requests, id.as_str(), None, &value).await?;
        Ok(true)
    }
}
