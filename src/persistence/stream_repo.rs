//! Stream repository for `SQLite` persistence.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::stream::{DeliveryStatus, StreamRecord, StreamSnapshot};
use crate::persistence::SnapshotSource;
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for stream records.
#[derive(Clone)]
pub struct StreamRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    stream_id: String,
    cursor_seq: i64,
    messages: String,
}

fn status_str(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Undelivered => "undelivered",
        DeliveryStatus::Delivered => "delivered",
        DeliveryStatus::Replay => "replay",
    }
}

impl StreamRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a stream record. Used by the ingest surface that
    /// queues batches for delivery.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization or the insert fails.
    pub async fn save(&self, record: &StreamRecord) -> Result<()> {
        let messages = serde_json::to_string(&record.messages)
            .map_err(|err| AppError::Db(format!("messages serialization failed: {err}")))?;

        sqlx::query(
            "INSERT OR REPLACE INTO pix_stream
             (region, ispb, stream_ts, stream_id, messages, status, cursor_seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.region)
        .bind(&record.ispb)
        .bind(record.stream_ts.to_rfc3339())
        .bind(&record.stream_id)
        .bind(&messages)
        .bind(status_str(record.status))
        .bind(record.cursor_seq)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for StreamRepo {
    /// Latest stream record for `(region, ispb)` by production timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is corrupt.
    async fn latest_snapshot(
        &self,
        region: &str,
        ispb: &str,
    ) -> Result<Option<StreamSnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT stream_id, cursor_seq, messages
             FROM pix_stream
             WHERE region = ?1 AND ispb = ?2
             ORDER BY stream_ts DESC
             LIMIT 1",
        )
        .bind(region)
        .bind(ispb)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(|row| {
            let messages: Vec<String> = serde_json::from_str(&row.messages)
                .map_err(|err| AppError::Db(format!("invalid messages column: {err}")))?;
            Ok(StreamSnapshot {
                stream_id: row.stream_id,
                cursor_seq: row.cursor_seq,
                messages,
            })
        })
        .transpose()
    }
}
