//! Cursor issuance and verification service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::cursor::CursorRecord;
use crate::persistence::CursorStore;
use crate::token::{TokenCodec, TokenError, TokenPayload};
use crate::Result;

/// Issues continuation tokens and persists their issuance metadata.
#[derive(Clone)]
pub struct CursorService {
    codec: TokenCodec,
    store: Arc<dyn CursorStore>,
    token_ttl: Duration,
}

impl CursorService {
    /// Create a service issuing tokens valid for `token_ttl`.
    #[must_use]
    pub fn new(codec: TokenCodec, store: Arc<dyn CursorStore>, token_ttl: Duration) -> Self {
        Self {
            codec,
            store,
            token_ttl,
        }
    }

    /// Issue a continuation token for a delivered batch and upsert the
    /// cursor record for its slot. Each issuance overwrites the previous
    /// record for that `(region, ispb, slot)` — only the latest is retained.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Token` if encoding fails and `AppError::Db` if the
    /// cursor store is unavailable.
    pub async fn issue_token(
        &self,
        region: &str,
        ispb: &str,
        thread_slot: u8,
        cursor_seq: i64,
        cursor_offset: &str,
    ) -> Result<String> {
        let now = Utc::now();
        let expiry = now + self.token_ttl;

        let payload = TokenPayload {
            ispb: ispb.to_owned(),
            thread: thread_slot,
            cursor_seq,
            cursor_offset: cursor_offset.to_owned(),
            shard: format!("{region}:{ispb}"),
            issued_at: now.timestamp_millis(),
            exp: expiry.timestamp_millis(),
        };
        let token = self.codec.encode(&payload)?;

        let record = CursorRecord {
            region: region.to_owned(),
            ispb: ispb.to_owned(),
            thread_slot,
            cursor_seq,
            cursor_offset: cursor_offset.to_owned(),
            token_fingerprint: sha256_hex(token.as_bytes()),
            token_expiry: expiry,
            last_heartbeat: now,
            token_id: Uuid::new_v4().to_string(),
        };
        self.store.upsert_cursor(&record).await?;

        Ok(token)
    }

    /// Verify a continuation token, surfacing the codec's error kinds.
    ///
    /// # Errors
    ///
    /// Returns the [`TokenError`] kind reported by the codec.
    pub fn verify(&self, token: &str) -> std::result::Result<TokenPayload, TokenError> {
        self.codec.verify(token)
    }
}

/// Compute the SHA-256 hex digest of the given bytes.
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
