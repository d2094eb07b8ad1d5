//! Cursor repository for `SQLite` persistence.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::cursor::CursorRecord;
use crate::persistence::CursorStore;
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for cursor records.
#[derive(Clone)]
pub struct CursorRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct CursorRow {
    region: String,
    ispb: String,
    thread_slot: i64,
    cursor_seq: i64,
    cursor_offset: String,
    token_fingerprint: String,
    token_expiry: String,
    last_heartbeat: String,
    token_id: String,
}

impl CursorRow {
    /// Convert a database row into the domain model.
    fn into_record(self) -> Result<CursorRecord> {
        let thread_slot = u8::try_from(self.thread_slot)
            .map_err(|_| AppError::Db(format!("invalid thread_slot: {}", self.thread_slot)))?;
        let token_expiry = chrono::DateTime::parse_from_rfc3339(&self.token_expiry)
            .map_err(|e| AppError::Db(format!("invalid token_expiry: {e}")))?
            .with_timezone(&Utc);
        let last_heartbeat = chrono::DateTime::parse_from_rfc3339(&self.last_heartbeat)
            .map_err(|e| AppError::Db(format!("invalid last_heartbeat: {e}")))?
            .with_timezone(&Utc);

        Ok(CursorRecord {
            region: self.region,
            ispb: self.ispb,
            thread_slot,
            cursor_seq: self.cursor_seq,
            cursor_offset: self.cursor_offset,
            token_fingerprint: self.token_fingerprint,
            token_expiry,
            last_heartbeat,
            token_id: self.token_id,
        })
    }
}

impl CursorRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CursorStore for CursorRepo {
    /// Insert or overwrite the cursor record keyed by `(region, ispb, slot)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    async fn upsert_cursor(&self, record: &CursorRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO pix_cursor (region, ispb, thread_slot, cursor_seq, cursor_offset,
             token_fingerprint, token_expiry, last_heartbeat, token_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(region, ispb, thread_slot) DO UPDATE SET
                 cursor_seq        = excluded.cursor_seq,
                 cursor_offset     = excluded.cursor_offset,
                 token_fingerprint = excluded.token_fingerprint,
                 token_expiry      = excluded.token_expiry,
                 last_heartbeat    = excluded.last_heartbeat,
                 token_id          = excluded.token_id",
        )
        .bind(&record.region)
        .bind(&record.ispb)
        .bind(i64::from(record.thread_slot))
        .bind(record.cursor_seq)
        .bind(&record.cursor_offset)
        .bind(&record.token_fingerprint)
        .bind(record.token_expiry.to_rfc3339())
        .bind(record.last_heartbeat.to_rfc3339())
        .bind(&record.token_id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Retrieve the cursor record for `(region, ispb, thread_slot)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is corrupt.
    async fn get_cursor(
        &self,
        region: &str,
        ispb: &str,
        thread_slot: u8,
    ) -> Result<Option<CursorRecord>> {
        let row: Option<CursorRow> = sqlx::query_as(
            "SELECT region, ispb, thread_slot, cursor_seq, cursor_offset,
                    token_fingerprint, token_expiry, last_heartbeat, token_id
             FROM pix_cursor
             WHERE region = ?1 AND ispb = ?2 AND thread_slot = ?3",
        )
        .bind(region)
        .bind(ispb)
        .bind(i64::from(thread_slot))
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(CursorRow::into_record).transpose()
    }
}
