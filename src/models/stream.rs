//! Stream record and snapshot models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery state of a persisted stream record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Batch produced but not yet pulled by the participant.
    Undelivered,
    /// Batch pulled at least once.
    Delivered,
    /// Batch re-queued for replay.
    Replay,
}

/// A persisted batch of outgoing messages for one participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StreamRecord {
    /// Deployment region the record belongs to.
    pub region: String,
    /// Participant identifier.
    pub ispb: String,
    /// Production timestamp; `latest` picks the newest record by this field.
    pub stream_ts: DateTime<Utc>,
    /// Unique stream identifier, used as the cursor offset on delivery.
    pub stream_id: String,
    /// Ordered message payloads.
    pub messages: Vec<String>,
    /// Delivery state.
    pub status: DeliveryStatus,
    /// Monotonic cursor sequence.
    pub cursor_seq: i64,
}

/// The latest available batch for a participant, as reported by the
/// snapshot source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    /// Stream identifier of the newest record.
    pub stream_id: String,
    /// Cursor sequence of the newest record.
    pub cursor_seq: i64,
    /// Ordered message payloads of the newest record.
    pub messages: Vec<String>,
}
