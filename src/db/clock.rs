//! Sync version allocation
//!
//! Versions come from a per-owner clock row in `sync_clocks`. The allocator is
//! always called on the connection of the transaction that performs the
//! write, so the stamp and the write commit together.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;

use crate::error::Result;

/// How new sync versions are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStrategy {
    /// Per-owner counter, strictly increasing
    Counter,
    /// Wall-clock milliseconds, non-decreasing, ties allowed
    WallClock,
}

impl FromStr for VersionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "counter" => Ok(VersionStrategy::Counter),
            "wallclock" | "wall_clock" => Ok(VersionStrategy::WallClock),
            other => Err(format!("unknown version strategy: {other}")),
        }
    }
}

/// Produces sync versions, one per mutation
#[derive(Debug, Clone, Copy)]
pub struct VersionAllocator {
    strategy: VersionStrategy,
}

impl VersionAllocator {
    pub fn new(strategy: VersionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> VersionStrategy {
        self.strategy
    }

    /// Allocate the next version for `owner_id`
    pub async fn next_version(&self, conn: &mut SqliteConnection, owner_id: i64) -> Result<i64> {
        let (version,): (i64,) = match self.strategy {
            VersionStrategy::Counter => {
                sqlx::query_as(
                    r#"
                    INSERT INTO sync_clocks (owner_id, version)
                    VALUES (?, 1)
                    ON CONFLICT(owner_id) DO UPDATE SET version = version + 1
                    RETURNING version
                    "#,
                )
                .bind(owner_id)
                .fetch_one(&mut *conn)
                .await?
            }
            VersionStrategy::WallClock => {
                // MAX keeps the clock from running backwards when the host clock does
                sqlx::query_as(
                    r#"
                    INSERT INTO sync_clocks (owner_id, version)
                    VALUES (?, ?)
                    ON CONFLICT(owner_id) DO UPDATE SET version = MAX(version, excluded.version)
                    RETURNING version
                    "#,
                )
                .bind(owner_id)
                .bind(Utc::now().timestamp_millis())
                .fetch_one(&mut *conn)
                .await?
            }
        };

        Ok(version)
    }
}

impl Default for VersionAllocator {
    fn default() -> Self {
        Self::new(VersionStrategy::Counter)
    }
}

/// Highest sync version across all of an owner's rows, 0 when none exist
pub async fn server_version(pool: &SqlitePool, owner_id: i64) -> Result<i64> {
    let (version,): (i64,) = sqlx::query_as(
        r#"
        SELECT MAX(
            COALESCE((SELECT MAX(sync_version) FROM todos WHERE owner_id = ?), 0),
            COALESCE((SELECT MAX(sync_version) FROM categories WHERE owner_id = ?), 0),
            COALESCE((SELECT sync_version FROM user_settings WHERE owner_id = ?), 0)
        )
        "#,
    )
    .bind(owner_id)
    .bind(owner_id)
    .bind(owner_id)
    .fetch_one(pool)
    .await?;

    Ok(version)
}
