//! Distributed thread-slot semaphore.
//!
//! Bounds concurrent pull sessions per participant. All accounting lives in
//! the shared store so horizontally-scaled instances observe a consistent
//! view; no slot state is cached in-process.

use std::time::Duration;

use tracing::{debug, info};

use crate::persistence::slot_repo::SlotRepo;
use crate::Result;

/// Maximum concurrent pull sessions per participant. The protocol advertises
/// capacity as `N/6`, so this is a constant rather than configuration.
pub const MAX_THREAD_SLOTS: u8 = 6;

/// Per-participant lease manager over the shared counting store.
#[derive(Clone)]
pub struct SlotManager {
    repo: SlotRepo,
    ttl: Duration,
}

impl SlotManager {
    /// Create a manager whose leases expire after `ttl`.
    #[must_use]
    pub fn new(repo: SlotRepo, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    /// Reserve a slot for `(ispb, caller_id)`.
    ///
    /// Expired leases are swept lazily as part of the same atomic store
    /// transaction; no background timer exists. Returns `None` when all
    /// [`MAX_THREAD_SLOTS`] slots are held.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the counting store is unavailable.
    pub async fn reserve(&self, ispb: &str, caller_id: &str) -> Result<Option<u8>> {
        let slot = self
            .repo
            .reserve(ispb, caller_id, self.ttl, MAX_THREAD_SLOTS)
            .await?;
        match slot {
            Some(slot) => debug!(ispb, caller_id, slot, "thread slot reserved"),
            None => info!(ispb, caller_id, "thread slots exhausted"),
        }
        Ok(slot)
    }

    /// Release one lease held by `(ispb, caller_id)`; no-op when none match.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the counting store is unavailable.
    pub async fn release(&self, ispb: &str, caller_id: &str) -> Result<()> {
        self.repo.release(ispb, caller_id).await?;
        debug!(ispb, caller_id, "thread slot released");
        Ok(())
    }

    /// Number of unexpired leases currently held for `ispb`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the counting store is unavailable.
    pub async fn active_leases(&self, ispb: &str) -> Result<u8> {
        self.repo.count_active(ispb, self.ttl).await
    }
}
