//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` — safe to
//! re-run on every server startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS thread_slot (
    ispb        TEXT NOT NULL,
    slot_number INTEGER NOT NULL,
    caller_id   TEXT NOT NULL,
    acquired_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_thread_slot_ispb ON thread_slot(ispb);

CREATE TABLE IF NOT EXISTS pix_cursor (
    region            TEXT NOT NULL,
    ispb              TEXT NOT NULL,
    thread_slot       INTEGER NOT NULL,
    cursor_seq        INTEGER NOT NULL,
    cursor_offset     TEXT NOT NULL,
    token_fingerprint TEXT NOT NULL,
    token_expiry      TEXT NOT NULL,
    last_heartbeat    TEXT NOT NULL,
    token_id          TEXT NOT NULL,
    PRIMARY KEY (region, ispb, thread_slot)
);

CREATE TABLE IF NOT EXISTS pix_stream (
    region      TEXT NOT NULL,
    ispb        TEXT NOT NULL,
    stream_ts   TEXT NOT NULL,
    stream_id   TEXT NOT NULL,
    messages    TEXT NOT NULL,
    status      TEXT NOT NULL CHECK(status IN ('undelivered','delivered','replay')),
    cursor_seq  INTEGER NOT NULL,
    PRIMARY KEY (region, ispb, stream_id)
);

CREATE INDEX IF NOT EXISTS idx_pix_stream_latest ON pix_stream(region, ispb, stream_ts);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
