//! Category persistence

use sqlx::{SqliteConnection, SqlitePool};

use super::clock::VersionAllocator;
use super::models::{Category, CategoryFields, CategoryPatch};
use super::{ensure_version, format_timestamp, now, parse_timestamp};
use crate::error::{AppError, Result};

const CATEGORY_COLUMNS: &str =
    "id, owner_id, name, color, icon, created_at, updated_at, is_deleted, sync_version";

/// Repository for category persistence
pub struct CategoryRepository<'a> {
    pool: &'a SqlitePool,
    clock: VersionAllocator,
}

impl<'a> CategoryRepository<'a> {
    pub fn new(pool: &'a SqlitePool, clock: VersionAllocator) -> Self {
        Self { pool, clock }
    }

    /// Insert a category; the name must be unique among the owner's live categories
    pub async fn create(&self, owner_id: i64, fields: &CategoryFields) -> Result<Category> {
        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;
        let now = now();
        let stamp = format_timestamp(&now);

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO categories (
                owner_id, name, color, icon, created_at, updated_at, is_deleted, sync_version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(owner_id)
        .bind(&fields.name)
        .bind(&fields.color)
        .bind(&fields.icon)
        .bind(&stamp)
        .bind(&stamp)
        .bind(fields.is_deleted)
        .bind(version)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| duplicate_name(e, &fields.name))?;

        tx.commit().await?;
        tracing::debug!(owner_id, id, version, "created category");

        Ok(Category {
            id,
            owner_id,
            name: fields.name.clone(),
            color: fields.color.clone(),
            icon: fields.icon.clone(),
            created_at: now,
            updated_at: now,
            is_deleted: fields.is_deleted,
            sync_version: version,
        })
    }

    /// Look up a category, including soft-deleted ones
    pub async fn find(&self, owner_id: i64, id: i64) -> Result<Option<Category>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, owner_id, id).await
    }

    /// Look up a live category
    pub async fn get(&self, owner_id: i64, id: i64) -> Result<Category> {
        self.find(owner_id, id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| AppError::not_found(format!("category {id} not found")))
    }

    /// List live categories in creation order
    pub async fn list(&self, owner_id: i64) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories \
             WHERE owner_id = ? AND is_deleted = 0 \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(owner_id)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(CategoryRow::into_category).collect()
    }

    /// Apply a partial update to a live category
    pub async fn update(&self, owner_id: i64, id: i64, patch: CategoryPatch) -> Result<Category> {
        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;

        let mut fields = fetch(&mut tx, owner_id, id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| AppError::not_found(format!("category {id} not found")))?
            .fields();
        patch.apply_to(&mut fields)?;

        let category = write(&mut tx, owner_id, id, &fields, version).await?;
        tx.commit().await?;
        Ok(category)
    }

    /// Overwrite name, color, icon and the deleted flag of any category.
    ///
    /// With `expected_version` set, a row that moved on in the meantime is
    /// left alone and the result is `Conflict`.
    pub async fn save_fields(
        &self,
        owner_id: i64,
        id: i64,
        fields: &CategoryFields,
        expected_version: Option<i64>,
    ) -> Result<Category> {
        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;

        let current = fetch(&mut tx, owner_id, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("category {id} not found")))?;
        ensure_version("category", id, current.sync_version, expected_version)?;

        let category = write(&mut tx, owner_id, id, fields, version).await?;
        tx.commit().await?;
        Ok(category)
    }

    /// Soft delete; the row stays and receives a new version
    pub async fn delete(&self, owner_id: i64, id: i64) -> Result<Category> {
        self.soft_delete(owner_id, id, None).await
    }

    /// Soft delete only if the row is still at `expected_version`
    pub async fn delete_at_version(
        &self,
        owner_id: i64,
        id: i64,
        expected_version: i64,
    ) -> Result<Category> {
        self.soft_delete(owner_id, id, Some(expected_version)).await
    }

    async fn soft_delete(&self, owner_id: i64, id: i64, expected: Option<i64>) -> Result<Category> {
        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;

        let current = fetch(&mut tx, owner_id, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("category {id} not found")))?;
        ensure_version("category", id, current.sync_version, expected)?;

        let sql = format!(
            "UPDATE categories SET is_deleted = 1, updated_at = ?, sync_version = ? \
             WHERE id = ? AND owner_id = ? RETURNING {CATEGORY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(format_timestamp(&now()))
            .bind(version)
            .bind(id)
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(owner_id, id, version, "deleted category");
        row.into_category()
    }

    /// All categories, deleted or not, stamped after `since`, oldest change first
    pub async fn changed_since(&self, owner_id: i64, since: i64) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories \
             WHERE owner_id = ? AND sync_version > ? \
             ORDER BY sync_version ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(owner_id)
            .bind(since)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(CategoryRow::into_category).collect()
    }
}

/// Runs inside a transaction that already allocated `version`
async fn write(
    conn: &mut SqliteConnection,
    owner_id: i64,
    id: i64,
    fields: &CategoryFields,
    version: i64,
) -> Result<Category> {
    let sql = format!(
        "UPDATE categories SET name = ?, color = ?, icon = ?, is_deleted = ?, \
             updated_at = ?, sync_version = ? \
         WHERE id = ? AND owner_id = ? RETURNING {CATEGORY_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(&fields.name)
        .bind(&fields.color)
        .bind(&fields.icon)
        .bind(fields.is_deleted)
        .bind(format_timestamp(&now()))
        .bind(version)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| duplicate_name(e, &fields.name))?
        .ok_or_else(|| AppError::not_found(format!("category {id} not found")))?;

    tracing::debug!(owner_id, id, version, "updated category");
    row.into_category()
}

async fn fetch(conn: &mut SqliteConnection, owner_id: i64, id: i64) -> Result<Option<Category>> {
    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ? AND owner_id = ?");
    sqlx::query_as::<_, CategoryRow>(&sql)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(conn)
        .await?
        .map(CategoryRow::into_category)
        .transpose()
}

/// Surface the per-owner name index as its own error kind
fn duplicate_name(err: sqlx::Error, name: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::DuplicateName(format!("category name {name:?} already exists"))
        }
        _ => err.into(),
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    owner_id: i64,
    name: String,
    color: String,
    icon: String,
    created_at: String,
    updated_at: String,
    is_deleted: bool,
    sync_version: i64,
}

impl CategoryRow {
    fn into_category(self) -> Result<Category> {
        Ok(Category {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            color: self.color,
            icon: self.icon,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            is_deleted: self.is_deleted,
            sync_version: self.sync_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, NewCategory};

    fn named(name: &str) -> CategoryFields {
        NewCategory {
            name: name.to_string(),
            color: "#FF0000".to_string(),
            icon: String::new(),
        }
        .into_fields()
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_name_per_owner() {
        let pool = test_pool().await;
        let repo = CategoryRepository::new(&pool, VersionAllocator::default());

        repo.create(1, &named("Work")).await.unwrap();

        let dup = repo.create(1, &named("Work")).await;
        assert!(matches!(dup, Err(AppError::DuplicateName(_))));
        assert_eq!(repo.list(1).await.unwrap().len(), 1);

        // Same name for someone else is fine
        let other = repo.create(2, &named("Work")).await.unwrap();
        assert_eq!(other.owner_id, 2);
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name() {
        let pool = test_pool().await;
        let repo = CategoryRepository::new(&pool, VersionAllocator::default());

        repo.create(1, &named("Work")).await.unwrap();
        let home = repo.create(1, &named("Home")).await.unwrap();

        let patch = CategoryPatch {
            name: Some("Work".into()),
            ..Default::default()
        };
        assert!(matches!(
            repo.update(1, home.id, patch).await,
            Err(AppError::DuplicateName(_))
        ));
        assert_eq!(repo.get(1, home.id).await.unwrap().name, "Home");
    }

    #[tokio::test]
    async fn test_deleted_name_can_be_reused() {
        let pool = test_pool().await;
        let repo = CategoryRepository::new(&pool, VersionAllocator::default());

        let old = repo.create(1, &named("Errands")).await.unwrap();
        let deleted = repo.delete(1, old.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(deleted.sync_version > old.sync_version);

        let fresh = repo.create(1, &named("Errands")).await.unwrap();
        assert_ne!(fresh.id, old.id);

        let listed = repo.list(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, fresh.id);

        let changed = repo.changed_since(1, 0).await.unwrap();
        assert_eq!(changed.len(), 2);
    }

    #[tokio::test]
    async fn test_default_icon_and_scoping() {
        let pool = test_pool().await;
        let repo = CategoryRepository::new(&pool, VersionAllocator::default());

        let c = repo.create(1, &named("Reading")).await.unwrap();
        assert_eq!(c.icon, "folder");
        assert!(matches!(repo.get(2, c.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(repo.delete(2, c.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_save_guarded_by_version() {
        let pool = test_pool().await;
        let repo = CategoryRepository::new(&pool, VersionAllocator::default());

        let c = repo.create(1, &named("Garden")).await.unwrap();
        let renamed = repo
            .update(
                1,
                c.id,
                CategoryPatch {
                    name: Some("Yard".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            repo.save_fields(1, c.id, &named("Lawn"), Some(c.sync_version)).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            repo.delete_at_version(1, c.id, c.sync_version).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(repo.get(1, c.id).await.unwrap(), renamed);

        let saved = repo
            .save_fields(1, c.id, &named("Lawn"), Some(renamed.sync_version))
            .await
            .unwrap();
        assert_eq!(saved.name, "Lawn");
        assert!(matches!(
            repo.save_fields(1, 999, &named("Ghost"), None).await,
            Err(AppError::NotFound(_))
        ));
    }
}
