//! `SQLite` connection and schema bootstrap.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::Result;

use super::schema;

/// Alias for the shared `SQLite` pool.
pub type Database = SqlitePool;

/// Connect to `SQLite` at `url` and apply the schema.
///
/// The pool is capped at a single connection: `SQLite` serializes writers
/// anyway, and one connection keeps every reserve transaction strictly
/// ordered against the shared lease table. It also makes `sqlite::memory:`
/// behave as one database across the whole process in tests.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema application fails.
pub async fn connect(url: &str) -> Result<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await?;
    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}
