//! Incremental reads for pull

use sqlx::SqlitePool;

use crate::db::{
    server_version, Category, CategoryRepository, SettingsRepository, Todo, TodoRepository,
    UserSettings, VersionAllocator,
};
use crate::error::Result;

/// Everything an owner changed after a given version
#[derive(Debug, Clone)]
pub struct SyncSnapshot {
    pub todos: Vec<Todo>,
    pub categories: Vec<Category>,
    pub settings: Option<UserSettings>,
    pub server_version: i64,
}

pub struct SyncReader<'a> {
    pool: &'a SqlitePool,
    clock: VersionAllocator,
}

impl<'a> SyncReader<'a> {
    pub fn new(pool: &'a SqlitePool, clock: VersionAllocator) -> Self {
        Self { pool, clock }
    }

    /// Current highest version across the owner's entities
    pub async fn server_version(&self, owner_id: i64) -> Result<i64> {
        server_version(self.pool, owner_id).await
    }

    /// Rows stamped after `since`, soft-deleted ones included.
    ///
    /// The ceiling is read before the rows, so a write landing in between shows
    /// up again on the next pull instead of being skipped.
    pub async fn pull(&self, owner_id: i64, since: i64) -> Result<SyncSnapshot> {
        let since = since.max(0);
        let ceiling = self.server_version(owner_id).await?;

        let todos = TodoRepository::new(self.pool, self.clock)
            .changed_since(owner_id, since)
            .await?;
        let categories = CategoryRepository::new(self.pool, self.clock)
            .changed_since(owner_id, since)
            .await?;
        let settings = SettingsRepository::new(self.pool, self.clock)
            .changed_since(owner_id, since)
            .await?;

        tracing::debug!(
            owner_id,
            since,
            server_version = ceiling,
            todos = todos.len(),
            categories = categories.len(),
            settings = settings.is_some(),
            "pulled changes"
        );

        Ok(SyncSnapshot {
            todos,
            categories,
            settings,
            server_version: ceiling,
        })
    }
}
