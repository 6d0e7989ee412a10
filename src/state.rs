//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::{CategoryRepository, SettingsRepository, TodoRepository, VersionAllocator};
use crate::sync::{ConflictResolver, SyncReader};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    clock: VersionAllocator,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool) -> Self {
        let clock = VersionAllocator::new(config.sync.version_strategy);
        Self {
            inner: Arc::new(AppStateInner { config, db, clock }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    pub fn clock(&self) -> VersionAllocator {
        self.inner.clock
    }

    pub fn todos(&self) -> TodoRepository<'_> {
        TodoRepository::new(self.db(), self.clock())
    }

    pub fn categories(&self) -> CategoryRepository<'_> {
        CategoryRepository::new(self.db(), self.clock())
    }

    pub fn settings(&self) -> SettingsRepository<'_> {
        SettingsRepository::new(self.db(), self.clock())
    }

    pub fn sync_reader(&self) -> SyncReader<'_> {
        SyncReader::new(self.db(), self.clock())
    }

    pub fn conflict_resolver(&self) -> ConflictResolver<'_> {
        ConflictResolver::new(self.db(), self.clock())
    }
}
