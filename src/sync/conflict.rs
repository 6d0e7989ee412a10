//! Conflict detection and batch reconciliation
//!
//! Each pushed item is classified independently: new items are created,
//! existing ones are updated (or soft-deleted) unless the server holds a
//! strictly newer write, in which case the server wins and nothing is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::types::{
    BatchSyncRequest, CategorySyncItem, EntityKind, SettingsSyncItem, SyncAction, SyncResult,
    TodoSyncItem,
};
use crate::db::{
    parse_client_timestamp, Category, CategoryRepository, SettingsFields, SettingsRepository,
    Todo, TodoRepository, VersionAllocator,
};
use crate::error::{AppError, Result};

/// Whether the server's copy must win over a pushed item.
///
/// Both the server timestamp must be strictly after the client's and the
/// server version strictly greater than the client's. An unparseable client
/// timestamp counts as the earliest possible instant.
pub fn is_conflict(
    server_updated_at: &DateTime<Utc>,
    server_version: i64,
    client_updated_at: &str,
    client_version: i64,
) -> bool {
    let client_seen =
        parse_client_timestamp(Some(client_updated_at)).unwrap_or(DateTime::<Utc>::MIN_UTC);
    *server_updated_at > client_seen && server_version > client_version
}

/// Reconciles pushed batches against server state
pub struct ConflictResolver<'a> {
    todos: TodoRepository<'a>,
    categories: CategoryRepository<'a>,
    settings: SettingsRepository<'a>,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(pool: &'a SqlitePool, clock: VersionAllocator) -> Self {
        Self {
            todos: TodoRepository::new(pool, clock),
            categories: CategoryRepository::new(pool, clock),
            settings: SettingsRepository::new(pool, clock),
        }
    }

    /// One result per submitted item: todos, then categories, then settings.
    ///
    /// A failing item is reported as an error and never stops the rest.
    pub async fn reconcile(&self, owner_id: i64, batch: &BatchSyncRequest) -> Vec<SyncResult> {
        let mut results = Vec::with_capacity(
            batch.todos.len() + batch.categories.len() + usize::from(batch.settings.is_some()),
        );

        for item in &batch.todos {
            results.push(reconcile_item(&self.todos, owner_id, item).await);
        }
        for item in &batch.categories {
            results.push(reconcile_item(&self.categories, owner_id, item).await);
        }
        if let Some(item) = &batch.settings {
            results.push(self.reconcile_settings(owner_id, item).await);
        }

        tracing::info!(
            owner_id,
            items = results.len(),
            conflicts = results.iter().filter(|r| r.action == SyncAction::Conflict).count(),
            errors = results.iter().filter(|r| r.action == SyncAction::Error).count(),
            "reconciled sync batch"
        );
        results
    }

    async fn reconcile_settings(&self, owner_id: i64, item: &SettingsSyncItem) -> SyncResult {
        match self.try_reconcile_settings(owner_id, item).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(owner_id, "settings sync failed: {}", e);
                SyncResult::error(EntityKind::Settings, 0, e.message())
            }
        }
    }

    async fn try_reconcile_settings(
        &self,
        owner_id: i64,
        item: &SettingsSyncItem,
    ) -> Result<SyncResult> {
        // Without a row there is nothing newer on the server to lose
        let (fields, checked_version) = match self.settings.find(owner_id).await? {
            None => (item.merge_into(SettingsFields::default())?, 0),
            Some(current) => {
                let fields = item.merge_into(current.fields())?;
                if fields != current.fields()
                    && is_conflict(
                        &current.updated_at,
                        current.sync_version,
                        &item.updated_at,
                        item.sync_version,
                    )
                {
                    tracing::warn!(
                        owner_id,
                        server_version = current.sync_version,
                        "settings conflict"
                    );
                    return Ok(SyncResult::conflict(
                        EntityKind::Settings,
                        0,
                        0,
                        current.sync_version,
                    ));
                }
                (fields, current.sync_version)
            }
        };

        let saved = match self
            .settings
            .save_fields(owner_id, &fields, Some(checked_version))
            .await
        {
            Ok(saved) => saved,
            Err(AppError::Conflict(msg)) => {
                tracing::warn!(owner_id, "settings changed during sync: {}", msg);
                let latest = self.settings.find(owner_id).await?.map_or(0, |s| s.sync_version);
                return Ok(SyncResult::conflict(EntityKind::Settings, 0, 0, latest));
            }
            Err(e) => return Err(e),
        };
        Ok(SyncResult::applied(
            EntityKind::Settings,
            SyncAction::Updated,
            0,
            0,
            saved.sync_version,
        ))
    }
}

/// An entity kind that is pushed item by item with a server-assigned id
#[async_trait]
trait SyncTarget: Sync {
    type Item: Sync;
    type Entity: Send + Sync;
    const KIND: EntityKind;

    fn item_id(item: &Self::Item) -> i64;

    /// (sync_version, updated_at) the client last saw
    fn client_stamp(item: &Self::Item) -> (i64, &str);

    /// (id, sync_version, updated_at) of the stored row
    fn server_stamp(entity: &Self::Entity) -> (i64, i64, DateTime<Utc>);

    /// Whether applying the item would change nothing
    fn same_content(entity: &Self::Entity, item: &Self::Item) -> bool;

    async fn create_from(&self, owner_id: i64, item: &Self::Item) -> Result<Self::Entity>;

    async fn find_existing(&self, owner_id: i64, id: i64) -> Result<Option<Self::Entity>>;

    async fn apply_item(
        &self,
        owner_id: i64,
        current: &Self::Entity,
        item: &Self::Item,
    ) -> Result<(SyncAction, Self::Entity)>;
}

async fn reconcile_item<T: SyncTarget>(target: &T, owner_id: i64, item: &T::Item) -> SyncResult {
    let local_id = T::item_id(item);
    match try_reconcile_item(target, owner_id, item).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(owner_id, local_id, kind = ?T::KIND, "sync item failed: {}", e);
            SyncResult::error(T::KIND, local_id, e.message())
        }
    }
}

async fn try_reconcile_item<T: SyncTarget>(
    target: &T,
    owner_id: i64,
    item: &T::Item,
) -> Result<SyncResult> {
    let local_id = T::item_id(item);

    if local_id < 0 {
        return Err(AppError::invalid(format!("invalid id {local_id}")));
    }

    if local_id == 0 {
        let created = target.create_from(owner_id, item).await?;
        let (server_id, version, _) = T::server_stamp(&created);
        tracing::debug!(owner_id, server_id, version, kind = ?T::KIND, "sync created");
        return Ok(SyncResult::applied(
            T::KIND,
            SyncAction::Created,
            local_id,
            server_id,
            version,
        ));
    }

    let Some(current) = target.find_existing(owner_id, local_id).await? else {
        return Ok(SyncResult::error(T::KIND, local_id, "not found"));
    };

    let (server_id, server_version, server_updated_at) = T::server_stamp(&current);
    let (client_version, client_updated_at) = T::client_stamp(item);

    if !T::same_content(&current, item)
        && is_conflict(&server_updated_at, server_version, client_updated_at, client_version)
    {
        tracing::warn!(
            owner_id,
            server_id,
            server_version,
            client_version,
            kind = ?T::KIND,
            "sync conflict, server wins"
        );
        return Ok(SyncResult::conflict(T::KIND, local_id, server_id, server_version));
    }

    // The write is refused if another one landed after the check above
    let (action, saved) = match target.apply_item(owner_id, &current, item).await {
        Ok(applied) => applied,
        Err(AppError::Conflict(msg)) => {
            tracing::warn!(owner_id, server_id, kind = ?T::KIND, "changed during sync: {}", msg);
            let latest = target
                .find_existing(owner_id, server_id)
                .await?
                .map_or(server_version, |e| T::server_stamp(&e).1);
            return Ok(SyncResult::conflict(T::KIND, local_id, server_id, latest));
        }
        Err(e) => return Err(e),
    };
    let (_, version, _) = T::server_stamp(&saved);
    tracing::debug!(owner_id, server_id, version, ?action, kind = ?T::KIND, "sync applied");
    Ok(SyncResult::applied(T::KIND, action, local_id, server_id, version))
}

#[async_trait]
impl SyncTarget for TodoRepository<'_> {
    type Item = TodoSyncItem;
    type Entity = Todo;
    const KIND: EntityKind = EntityKind::Todo;

    fn item_id(item: &TodoSyncItem) -> i64 {
        item.id
    }

    fn client_stamp(item: &TodoSyncItem) -> (i64, &str) {
        (item.sync_version, &item.updated_at)
    }

    fn server_stamp(entity: &Todo) -> (i64, i64, DateTime<Utc>) {
        (entity.id, entity.sync_version, entity.updated_at)
    }

    fn same_content(entity: &Todo, item: &TodoSyncItem) -> bool {
        item.to_fields().is_ok_and(|f| f == entity.fields())
    }

    async fn create_from(&self, owner_id: i64, item: &TodoSyncItem) -> Result<Todo> {
        let fields = item.to_fields()?;
        self.create(owner_id, &fields).await
    }

    async fn find_existing(&self, owner_id: i64, id: i64) -> Result<Option<Todo>> {
        self.find(owner_id, id).await
    }

    async fn apply_item(
        &self,
        owner_id: i64,
        current: &Todo,
        item: &TodoSyncItem,
    ) -> Result<(SyncAction, Todo)> {
        if item.is_deleted {
            let deleted = self
                .delete_at_version(owner_id, current.id, current.sync_version)
                .await?;
            return Ok((SyncAction::Deleted, deleted));
        }

        let fields = item.to_fields()?;
        let saved = self
            .save_fields(owner_id, current.id, &fields, Some(current.sync_version))
            .await?;
        Ok((SyncAction::Updated, saved))
    }
}

#[async_trait]
impl SyncTarget for CategoryRepository<'_> {
    type Item = CategorySyncItem;
    type Entity = Category;
    const KIND: EntityKind = EntityKind::Category;

    fn item_id(item: &CategorySyncItem) -> i64 {
        item.id
    }

    fn client_stamp(item: &CategorySyncItem) -> (i64, &str) {
        (item.sync_version, &item.updated_at)
    }

    fn server_stamp(entity: &Category) -> (i64, i64, DateTime<Utc>) {
        (entity.id, entity.sync_version, entity.updated_at)
    }

    fn same_content(entity: &Category, item: &CategorySyncItem) -> bool {
        item.to_fields().is_ok_and(|f| f == entity.fields())
    }

    async fn create_from(&self, owner_id: i64, item: &CategorySyncItem) -> Result<Category> {
        let fields = item.to_fields()?;
        self.create(owner_id, &fields).await
    }

    async fn find_existing(&self, owner_id: i64, id: i64) -> Result<Option<Category>> {
        self.find(owner_id, id).await
    }

    async fn apply_item(
        &self,
        owner_id: i64,
        current: &Category,
        item: &CategorySyncItem,
    ) -> Result<(SyncAction, Category)> {
        if item.is_deleted {
            let deleted = self
                .delete_at_version(owner_id, current.id, current.sync_version)
                .await?;
            return Ok((SyncAction::Deleted, deleted));
        }

        let fields = item.to_fields()?;
        let saved = self
            .save_fields(owner_id, current.id, &fields, Some(current.sync_version))
            .await?;
        Ok((SyncAction::Updated, saved))
    }
}
