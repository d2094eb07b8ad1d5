//! Thread-slot lease repository for `SQLite` persistence.
//!
//! Lease timestamps are stored as epoch milliseconds so the lazy TTL sweep
//! is a single indexed comparison.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for thread-slot lease rows.
#[derive(Clone)]
pub struct SlotRepo {
    db: Arc<Database>,
}

impl SlotRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Atomically reserve a slot for `(ispb, caller_id)`.
    ///
    /// Runs purge-count-insert as one transaction: leases older than
    /// `now - ttl` are swept first, the remaining active leases are counted,
    /// and when the count is below `limit` a new lease is inserted whose slot
    /// number equals the current active count. Returns `None` when the
    /// participant is at capacity. Two concurrent reservations can never
    /// compute the same slot number because the transaction serializes them.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any statement in the transaction fails.
    pub async fn reserve(
        &self,
        ispb: &str,
        caller_id: &str,
        ttl: Duration,
        limit: u8,
    ) -> Result<Option<u8>> {
        let now = Utc::now().timestamp_millis();
        let cutoff = now - i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM thread_slot WHERE ispb = ?1 AND acquired_at < ?2")
            .bind(ispb)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM thread_slot WHERE ispb = ?1")
            .bind(ispb)
            .fetch_one(&mut *tx)
            .await?;

        if active >= i64::from(limit) {
            tx.rollback().await?;
            return Ok(None);
        }

        let slot = u8::try_from(active)
            .map_err(|_| AppError::Db(format!("lease count out of range: {active}")))?;

        sqlx::query(
            "INSERT INTO thread_slot (ispb, slot_number, caller_id, acquired_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(ispb)
        .bind(i64::from(slot))
        .bind(caller_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(slot))
    }

    /// Remove the oldest lease held by `(ispb, caller_id)`.
    ///
    /// A missing match is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn release(&self, ispb: &str, caller_id: &str) -> Result<()> {
        sqlx::query(
            "DELETE FROM thread_slot WHERE rowid IN (
                 SELECT rowid FROM thread_slot
                 WHERE ispb = ?1 AND caller_id = ?2
                 ORDER BY acquired_at
                 LIMIT 1
             )",
        )
        .bind(ispb)
        .bind(caller_id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Count leases for `ispb` younger than `ttl`.
    ///
    /// Expired rows still awaiting the lazy sweep are excluded from the count.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_active(&self, ispb: &str, ttl: Duration) -> Result<u8> {
        let cutoff =
            Utc::now().timestamp_millis() - i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM thread_slot WHERE ispb = ?1 AND acquired_at >= ?2",
        )
        .bind(ispb)
        .bind(cutoff)
        .fetch_one(self.db.as_ref())
        .await?;
        u8::try_from(count).map_err(|_| AppError::Db(format!("lease count out of range: {count}")))
    }
}
