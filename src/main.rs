#![forbid(unsafe_code)]

//! `pix-outgoing-stream` — pull-based PIX message stream gateway binary.
//!
//! Bootstraps configuration, the `SQLite` store, and the HTTP transport,
//! then serves until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pix_outgoing_stream::batch::BatchFramer;
use pix_outgoing_stream::config::GlobalConfig;
use pix_outgoing_stream::cursor::CursorService;
use pix_outgoing_stream::http::identity::IdentityVerifier;
use pix_outgoing_stream::http::{self, AppState};
use pix_outgoing_stream::orchestrator::StreamOrchestrator;
use pix_outgoing_stream::persistence::cursor_repo::CursorRepo;
use pix_outgoing_stream::persistence::slot_repo::SlotRepo;
use pix_outgoing_stream::persistence::stream_repo::StreamRepo;
use pix_outgoing_stream::persistence::{db, CursorStore, SnapshotSource};
use pix_outgoing_stream::slots::SlotManager;
use pix_outgoing_stream::token::TokenCodec;
use pix_outgoing_stream::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "pix-outgoing-stream", about = "PIX outgoing stream gateway", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("pix-outgoing-stream server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_secret();
    let config = Arc::new(config);
    info!(service = %config.service_name, env = %config.environment, "configuration loaded");

    // ── Initialize database ─────────────────────────────
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|err| AppError::Db(format!("failed to create db dir: {err}")))?;
        }
    }
    let db = Arc::new(db::connect(&config.db_url()).await?);
    info!("database connected");

    // ── Assemble the core ───────────────────────────────
    let slots = SlotManager::new(SlotRepo::new(Arc::clone(&db)), config.slot_ttl());
    let cursors = CursorService::new(
        TokenCodec::new(config.security.token_secret.as_bytes()),
        Arc::new(CursorRepo::new(Arc::clone(&db))) as Arc<dyn CursorStore>,
        config.token_ttl(),
    );
    let snapshots = Arc::new(StreamRepo::new(Arc::clone(&db))) as Arc<dyn SnapshotSource>;
    let orchestrator = Arc::new(StreamOrchestrator::new(
        slots,
        cursors,
        BatchFramer,
        snapshots,
        config.stream.region.clone(),
    ));

    let state = AppState {
        identity: IdentityVerifier::from_config(&config.security),
        config: Arc::clone(&config),
        orchestrator,
    };

    // ── Serve until shutdown ────────────────────────────
    http::serve(state, shutdown_signal()).await?;
    info!("pix-outgoing-stream shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
