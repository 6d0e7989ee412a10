//! Database module for SQLite persistence
//!
//! Owner-scoped repositories for todos, categories and user settings. Every
//! mutation is stamped by the [`VersionAllocator`] inside the same
//! transaction as the write.

mod categories;
mod clock;
mod models;
mod schema;
mod settings;
mod todos;

pub use categories::CategoryRepository;
pub use clock::{server_version, VersionAllocator, VersionStrategy};
pub use models::*;
pub use schema::initialize_schema;
pub use settings::SettingsRepository;
pub use todos::TodoRepository;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Create a new database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    initialize_schema(&pool).await?;

    Ok(pool)
}

/// How long a writer waits for the database write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Current time at the precision timestamps are stored with
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Timestamps are stored as RFC3339 with millisecond precision
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("corrupt timestamp {raw:?}: {e}")))
}

pub(crate) fn parse_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

/// Fail with `Conflict` when the row moved past the version a caller checked.
///
/// Only meaningful inside a write transaction that already holds the lock.
pub(crate) fn ensure_version(kind: &str, id: i64, found: i64, expected: Option<i64>) -> Result<()> {
    match expected {
        Some(expected) if expected != found => Err(AppError::Conflict(format!(
            "{kind} {id} is at version {found}, expected {expected}"
        ))),
        _ => Ok(()),
    }
}

/// Clamp paging input to the accepted window
pub(crate) fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = match limit {
        Some(l) if l > 0 && l <= MAX_PAGE_SIZE => l,
        _ => DEFAULT_PAGE_SIZE,
    };
    (limit, offset.unwrap_or(0).max(0))
}

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    initialize_schema(&pool).await.unwrap();
    pool
}
