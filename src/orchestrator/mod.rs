//! Protocol state machine for the start/continue pull operations.
//!
//! Composes the slot semaphore, cursor service, batch framer, and snapshot
//! source. Business outcomes (exhaustion, invalid tokens) are recovered into
//! [`PullOutcome`]; collaborator failures propagate as `AppError` without
//! internal retries.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tracing::{info, warn};

use crate::batch::BatchFramer;
use crate::cursor::CursorService;
use crate::persistence::SnapshotSource;
use crate::slots::SlotManager;
use crate::token::TokenError;
use crate::Result;

/// Suggested client wait before retrying after slot exhaustion, in seconds.
pub const RETRY_AFTER_SECONDS: u64 = 5;

/// Why a presented continuation token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTokenReason {
    /// Token does not have the `payload.signature` shape.
    Malformed,
    /// Signature does not match the payload segment.
    BadSignature,
    /// Signature is valid but the expiry has passed.
    Expired,
    /// Token was issued to a different participant than the request names.
    ParticipantMismatch,
}

impl From<TokenError> for InvalidTokenReason {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => Self::Malformed,
            TokenError::BadSignature => Self::BadSignature,
            TokenError::Expired => Self::Expired,
        }
    }
}

impl Display for InvalidTokenReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed token"),
            Self::BadSignature => write!(f, "invalid signature"),
            Self::Expired => write!(f, "token expired"),
            Self::ParticipantMismatch => write!(f, "token ISPB mismatch"),
        }
    }
}

/// Result of one protocol operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// A batch was framed and a continuation token issued.
    Delivered {
        /// Slot assigned for this session.
        slot: u8,
        /// Continuation token for the next call.
        token: String,
        /// Content type of the framed body.
        content_type: String,
        /// Framed multipart body.
        body: String,
    },
    /// No snapshot is available; the reserved slot is retained.
    NoContent {
        /// Slot assigned for this session.
        slot: u8,
    },
    /// All thread slots for the participant are held.
    Exhausted {
        /// Suggested wait before retrying, in seconds.
        retry_after_seconds: u64,
    },
    /// The presented continuation token was rejected.
    InvalidToken {
        /// Rejection kind.
        reason: InvalidTokenReason,
    },
}

/// Sequences the core components into the start/continue protocol.
pub struct StreamOrchestrator {
    slots: SlotManager,
    cursors: CursorService,
    framer: BatchFramer,
    snapshots: Arc<dyn SnapshotSource>,
    region: String,
}

impl StreamOrchestrator {
    /// Assemble the orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        slots: SlotManager,
        cursors: CursorService,
        framer: BatchFramer,
        snapshots: Arc<dyn SnapshotSource>,
        region: String,
    ) -> Self {
        Self {
            slots,
            cursors,
            framer,
            snapshots,
            region,
        }
    }

    /// Begin a pull session for `ispb`.
    ///
    /// Reserves a thread slot, fetches the participant's latest snapshot, and
    /// on success frames the batch and issues a continuation token embedding
    /// the snapshot's cursor and the assigned slot. When no snapshot exists
    /// the slot is retained, not released: a short-interval retry reuses the
    /// lease, and only TTL expiry or an explicit release reclaims it.
    ///
    /// # Errors
    ///
    /// Returns `AppError` when the counting store, snapshot source, or cursor
    /// store fails.
    pub async fn start(&self, ispb: &str, caller_id: &str) -> Result<PullOutcome> {
        let Some(slot) = self.slots.reserve(ispb, caller_id).await? else {
            warn!(ispb, "pull rejected: thread slots exhausted");
            return Ok(PullOutcome::Exhausted {
                retry_after_seconds: RETRY_AFTER_SECONDS,
            });
        };

        let Some(snapshot) = self.snapshots.latest_snapshot(&self.region, ispb).await? else {
            // Slot deliberately retained; see module docs.
            info!(ispb, slot, "no content available");
            return Ok(PullOutcome::NoContent { slot });
        };

        let batch = self.framer.build(&snapshot.messages);
        let token = self
            .cursors
            .issue_token(
                &self.region,
                ispb,
                slot,
                snapshot.cursor_seq,
                &snapshot.stream_id,
            )
            .await?;

        info!(
            ispb,
            slot,
            messages = snapshot.messages.len(),
            "batch delivered"
        );
        Ok(PullOutcome::Delivered {
            slot,
            token,
            content_type: batch.content_type,
            body: batch.body,
        })
    }

    /// Resume a pull session using a previously issued token.
    ///
    /// The token is verified before any slot reservation is attempted; a
    /// rejected token never consumes capacity. The cursor position carried by
    /// a valid token is intentionally not used to fetch an incremental delta:
    /// every successful continuation re-fetches whatever the snapshot source
    /// currently reports as latest.
    ///
    /// # Errors
    ///
    /// Returns `AppError` when a collaborator fails during the delegated
    /// `start` call.
    pub async fn next(&self, ispb: &str, token: &str, caller_id: &str) -> Result<PullOutcome> {
        let payload = match self.cursors.verify(token) {
            Ok(payload) => payload,
            Err(err) => {
                info!(ispb, %err, "continuation token rejected");
                return Ok(PullOutcome::InvalidToken { reason: err.into() });
            }
        };

        if payload.ispb != ispb {
            info!(ispb, token_ispb = %payload.ispb, "continuation token ISPB mismatch");
            return Ok(PullOutcome::InvalidToken {
                reason: InvalidTokenReason::ParticipantMismatch,
            });
        }

        self.start(ispb, caller_id).await
    }

    /// Explicitly release one lease held by `(ispb, caller_id)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the counting store is unavailable.
    pub async fn release(&self, ispb: &str, caller_id: &str) -> Result<()> {
        self.slots.release(ispb, caller_id).await
    }
}
