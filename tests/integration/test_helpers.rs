//! Shared test helpers for orchestrator and HTTP integration tests.
//!
//! Builds the full component stack over an in-memory `SQLite` pool so
//! individual test modules can focus on behaviour rather than wiring.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use pix_outgoing_stream::batch::BatchFramer;
use pix_outgoing_stream::config::GlobalConfig;
use pix_outgoing_stream::cursor::CursorService;
use pix_outgoing_stream::http::identity::IdentityVerifier;
use pix_outgoing_stream::http::AppState;
use pix_outgoing_stream::models::stream::{DeliveryStatus, StreamRecord};
use pix_outgoing_stream::orchestrator::StreamOrchestrator;
use pix_outgoing_stream::persistence::cursor_repo::CursorRepo;
use pix_outgoing_stream::persistence::db::{self, Database};
use pix_outgoing_stream::persistence::slot_repo::SlotRepo;
use pix_outgoing_stream::persistence::stream_repo::StreamRepo;
use pix_outgoing_stream::persistence::{CursorStore, SnapshotSource};
use pix_outgoing_stream::slots::SlotManager;
use pix_outgoing_stream::token::TokenCodec;

/// Region every harness component is scoped to.
pub const TEST_REGION: &str = "sa-east-1";

/// Signing secret shared by harness codecs.
pub const TEST_SECRET: &str = "integration-secret";

/// Fully wired component stack over one in-memory database.
pub struct TestHarness {
    pub config: Arc<GlobalConfig>,
    pub db: Arc<Database>,
    pub orchestrator: Arc<StreamOrchestrator>,
    pub slots: SlotManager,
    pub streams: StreamRepo,
}

/// Build a harness with default configuration.
pub async fn harness() -> TestHarness {
    harness_with(|_| {}).await
}

/// Build a harness, letting the caller mutate the config first.
pub async fn harness_with(mutate: impl FnOnce(&mut GlobalConfig)) -> TestHarness {
    let mut config = GlobalConfig::from_toml_str("db_path = ':memory:'").expect("test config");
    config.security.token_secret = TEST_SECRET.into();
    mutate(&mut config);
    let config = Arc::new(config);

    let pool = Arc::new(db::connect("sqlite::memory:").await.expect("connect"));
    let slots = SlotManager::new(SlotRepo::new(Arc::clone(&pool)), config.slot_ttl());
    let cursors = CursorService::new(
        codec(),
        Arc::new(CursorRepo::new(Arc::clone(&pool))) as Arc<dyn CursorStore>,
        config.token_ttl(),
    );
    let streams = StreamRepo::new(Arc::clone(&pool));
    let orchestrator = Arc::new(StreamOrchestrator::new(
        slots.clone(),
        cursors,
        BatchFramer,
        Arc::new(streams.clone()) as Arc<dyn SnapshotSource>,
        TEST_REGION.to_owned(),
    ));

    TestHarness {
        config,
        db: pool,
        orchestrator,
        slots,
        streams,
    }
}

/// Codec keyed with the harness secret, for inspecting issued tokens.
pub fn codec() -> TokenCodec {
    TokenCodec::new(TEST_SECRET)
}

/// Application state for HTTP-level tests.
pub fn app_state(harness: &TestHarness) -> AppState {
    AppState {
        identity: IdentityVerifier::from_config(&harness.config.security),
        config: Arc::clone(&harness.config),
        orchestrator: Arc::clone(&harness.orchestrator),
    }
}

/// Persist a deliverable stream record for `ispb`.
pub async fn seed_stream(
    streams: &StreamRepo,
    ispb: &str,
    stream_id: &str,
    cursor_seq: i64,
    stream_ts: DateTime<Utc>,
    messages: &[&str],
) {
    streams
        .save(&StreamRecord {
            region: TEST_REGION.to_owned(),
            ispb: ispb.to_owned(),
            stream_ts,
            stream_id: stream_id.to_owned(),
            messages: messages.iter().map(|m| (*m).to_owned()).collect(),
            status: DeliveryStatus::Undelivered,
            cursor_seq,
        })
        .await
        .expect("seed stream");
}
