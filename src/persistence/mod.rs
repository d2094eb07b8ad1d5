//! `SQLite` persistence: connection handling, schema, and repositories.
//!
//! The orchestrator and cursor service depend on the capability traits
//! defined here, not on any concrete store client, so alternative backends
//! can be swapped in behind the same contracts.

use async_trait::async_trait;

use crate::models::cursor::CursorRecord;
use crate::models::stream::StreamSnapshot;
use crate::Result;

pub mod cursor_repo;
pub mod db;
pub mod schema;
pub mod slot_repo;
pub mod stream_repo;

/// Read access to the latest message snapshot per participant.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Latest available batch for `(region, ispb)`, or `None` when the
    /// participant has nothing queued.
    async fn latest_snapshot(&self, region: &str, ispb: &str)
        -> Result<Option<StreamSnapshot>>;
}

/// Persistence of continuation-cursor issuance metadata.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Insert or overwrite the cursor record for its `(region, ispb, slot)` key.
    async fn upsert_cursor(&self, record: &CursorRecord) -> Result<()>;

    /// Read back the cursor record for `(region, ispb, thread_slot)`.
    async fn get_cursor(
        &self,
        region: &str,
        ispb: &str,
        thread_slot: u8,
    ) -> Result<Option<CursorRecord>>;
}
