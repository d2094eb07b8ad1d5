//! Cursor record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Issuance metadata persisted per `(region, ispb, thread_slot)`.
///
/// Overwritten on every new token issuance for that slot — only the most
/// recent issuance per slot is retained, never appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CursorRecord {
    /// Deployment region the cursor belongs to.
    pub region: String,
    /// Participant identifier.
    pub ispb: String,
    /// Thread slot the token was issued for.
    pub thread_slot: u8,
    /// Monotonic cursor sequence of the delivered batch.
    pub cursor_seq: i64,
    /// Opaque position marker of the delivered batch.
    pub cursor_offset: String,
    /// SHA-256 hex digest of the issued token.
    pub token_fingerprint: String,
    /// Expiry instant of the issued token.
    pub token_expiry: DateTime<Utc>,
    /// Last time this slot's cursor was touched.
    pub last_heartbeat: DateTime<Utc>,
    /// Unique identifier of the issued token.
    pub token_id: String,
}
