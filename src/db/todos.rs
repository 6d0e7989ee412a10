//! Todo persistence
//!
//! Every query is scoped by `owner_id`. Writes run in a transaction that also
//! allocates the row's new sync version.

use sqlx::{SqliteConnection, SqlitePool};

use super::clock::VersionAllocator;
use super::models::{Priority, Todo, TodoFields, TodoPatch};
use super::{ensure_version, format_timestamp, now, parse_optional_timestamp, parse_timestamp};
use crate::error::{AppError, Result};

const TODO_COLUMNS: &str = "id, owner_id, title, description, completed, priority, due_date, \
     tags, category_id, reminder, created_at, updated_at, is_deleted, sync_version";

/// Repository for todo persistence
pub struct TodoRepository<'a> {
    pool: &'a SqlitePool,
    clock: VersionAllocator,
}

impl<'a> TodoRepository<'a> {
    pub fn new(pool: &'a SqlitePool, clock: VersionAllocator) -> Self {
        Self { pool, clock }
    }

    /// Insert a new todo owned by `owner_id`
    pub async fn create(&self, owner_id: i64, fields: &TodoFields) -> Result<Todo> {
        let tags = serde_json::to_string(&fields.tags)?;
        let mut tx = self.pool.begin().await?;
        // Stamping first takes the write lock before anything is read
        let version = self.clock.next_version(&mut tx, owner_id).await?;

        if let Some(category_id) = fields.category_id {
            ensure_category_live(&mut tx, owner_id, category_id).await?;
        }

        let now = now();
        let stamp = format_timestamp(&now);

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO todos (
                owner_id, title, description, completed, priority, due_date, tags,
                category_id, reminder, created_at, updated_at, is_deleted, sync_version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(owner_id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.completed)
        .bind(i64::from(fields.priority))
        .bind(fields.due_date.as_ref().map(format_timestamp))
        .bind(&tags)
        .bind(fields.category_id)
        .bind(fields.reminder.as_ref().map(format_timestamp))
        .bind(&stamp)
        .bind(&stamp)
        .bind(fields.is_deleted)
        .bind(version)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(owner_id, id, version, "created todo");

        Ok(Todo {
            id,
            owner_id,
            title: fields.title.clone(),
            description: fields.description.clone(),
            completed: fields.completed,
            priority: fields.priority,
            due_date: fields.due_date,
            tags: fields.tags.clone(),
            category_id: fields.category_id,
            reminder: fields.reminder,
            created_at: now,
            updated_at: now,
            is_deleted: fields.is_deleted,
            sync_version: version,
        })
    }

    /// Look up a todo, including soft-deleted ones
    pub async fn find(&self, owner_id: i64, id: i64) -> Result<Option<Todo>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, owner_id, id).await
    }

    /// Look up a live todo
    pub async fn get(&self, owner_id: i64, id: i64) -> Result<Todo> {
        self.find(owner_id, id)
            .await?
            .filter(|t| !t.is_deleted)
            .ok_or_else(|| AppError::not_found(format!("todo {id} not found")))
    }

    /// List live todos, newest first
    pub async fn list(&self, owner_id: i64, limit: i64, offset: i64) -> Result<Vec<Todo>> {
        let sql = format!(
            "SELECT {TODO_COLUMNS} FROM todos \
             WHERE owner_id = ? AND is_deleted = 0 \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, TodoRow>(&sql)
            .bind(owner_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(TodoRow::into_todo).collect()
    }

    /// Case-insensitive substring search over title and description
    pub async fn search(
        &self,
        owner_id: i64,
        keyword: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Todo>> {
        let pattern = format!("%{}%", escape_like(keyword));
        let sql = format!(
            "SELECT {TODO_COLUMNS} FROM todos \
             WHERE owner_id = ? AND is_deleted = 0 \
               AND (title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\') \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, TodoRow>(&sql)
            .bind(owner_id)
            .bind(&pattern)
            .bind(&pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(TodoRow::into_todo).collect()
    }

    /// Apply a partial update to a live todo
    pub async fn update(&self, owner_id: i64, id: i64, patch: TodoPatch) -> Result<Todo> {
        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;

        let current = fetch(&mut tx, owner_id, id)
            .await?
            .filter(|t| !t.is_deleted)
            .ok_or_else(|| AppError::not_found(format!("todo {id} not found")))?;
        let mut fields = current.fields();
        patch.apply_to(&mut fields)?;

        let todo = self.write(&mut tx, &current, &fields, version).await?;
        tx.commit().await?;
        Ok(todo)
    }

    /// Overwrite every client-writable field, including the deleted flag.
    ///
    /// With `expected_version` set, the write only happens if the row is still
    /// at that version; otherwise the result is `Conflict`.
    pub async fn save_fields(
        &self,
        owner_id: i64,
        id: i64,
        fields: &TodoFields,
        expected_version: Option<i64>,
    ) -> Result<Todo> {
        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;

        let current = fetch(&mut tx, owner_id, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("todo {id} not found")))?;
        ensure_version("todo", id, current.sync_version, expected_version)?;

        let todo = self.write(&mut tx, &current, fields, version).await?;
        tx.commit().await?;
        Ok(todo)
    }

    /// Soft delete; the row stays and receives a new version
    pub async fn delete(&self, owner_id: i64, id: i64) -> Result<Todo> {
        self.soft_delete(owner_id, id, None).await
    }

    /// Soft delete only if the row is still at `expected_version`
    pub async fn delete_at_version(
        &self,
        owner_id: i64,
        id: i64,
        expected_version: i64,
    ) -> Result<Todo> {
        self.soft_delete(owner_id, id, Some(expected_version)).await
    }

    async fn soft_delete(&self, owner_id: i64, id: i64, expected: Option<i64>) -> Result<Todo> {
        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;

        let current = fetch(&mut tx, owner_id, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("todo {id} not found")))?;
        ensure_version("todo", id, current.sync_version, expected)?;

        let sql = format!(
            "UPDATE todos SET is_deleted = 1, updated_at = ?, sync_version = ? \
             WHERE id = ? AND owner_id = ? RETURNING {TODO_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TodoRow>(&sql)
            .bind(format_timestamp(&now()))
            .bind(version)
            .bind(id)
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(owner_id, id, version, "deleted todo");
        row.into_todo()
    }

    /// All todos, deleted or not, stamped after `since`, oldest change first
    pub async fn changed_since(&self, owner_id: i64, since: i64) -> Result<Vec<Todo>> {
        let sql = format!(
            "SELECT {TODO_COLUMNS} FROM todos \
             WHERE owner_id = ? AND sync_version > ? \
             ORDER BY sync_version ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, TodoRow>(&sql)
            .bind(owner_id)
            .bind(since)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(TodoRow::into_todo).collect()
    }

    /// Runs inside a transaction that already allocated `version`
    async fn write(
        &self,
        conn: &mut SqliteConnection,
        current: &Todo,
        fields: &TodoFields,
        version: i64,
    ) -> Result<Todo> {
        let (owner_id, id) = (current.owner_id, current.id);
        let tags = serde_json::to_string(&fields.tags)?;

        // Only a changed reference has to point at a live category
        if let Some(category_id) = fields.category_id.filter(|c| Some(*c) != current.category_id) {
            ensure_category_live(conn, owner_id, category_id).await?;
        }

        let sql = format!(
            "UPDATE todos SET title = ?, description = ?, completed = ?, priority = ?, \
                 due_date = ?, tags = ?, category_id = ?, reminder = ?, is_deleted = ?, \
                 updated_at = ?, sync_version = ? \
             WHERE id = ? AND owner_id = ? RETURNING {TODO_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TodoRow>(&sql)
            .bind(&fields.title)
            .bind(&fields.description)
            .bind(fields.completed)
            .bind(i64::from(fields.priority))
            .bind(fields.due_date.as_ref().map(format_timestamp))
            .bind(&tags)
            .bind(fields.category_id)
            .bind(fields.reminder.as_ref().map(format_timestamp))
            .bind(fields.is_deleted)
            .bind(format_timestamp(&now()))
            .bind(version)
            .bind(id)
            .bind(owner_id)
            .fetch_one(&mut *conn)
            .await?;

        tracing::debug!(owner_id, id, version, "updated todo");
        row.into_todo()
    }
}

async fn fetch(conn: &mut SqliteConnection, owner_id: i64, id: i64) -> Result<Option<Todo>> {
    let sql = format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ? AND owner_id = ?");
    sqlx::query_as::<_, TodoRow>(&sql)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(conn)
        .await?
        .map(TodoRow::into_todo)
        .transpose()
}

/// A todo may only point at a live category of the same owner
async fn ensure_category_live(
    conn: &mut SqliteConnection,
    owner_id: i64,
    category_id: i64,
) -> Result<()> {
    let found: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM categories WHERE id = ? AND owner_id = ? AND is_deleted = 0",
    )
            .bind(category_id)
            .bind(owner_id)
            .fetch_optional(conn)
            .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(AppError::invalid(format!("category {category_id} not found"))),
    }
}

fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(sqlx::FromRow)]
struct TodoRow {
    id: i64,
    owner_id: i64,
    title: String,
    description: String,
    completed: bool,
    priority: i64,
    due_date: Option<String>,
    tags: String,
    category_id: Option<i64>,
    reminder: Option<String>,
    created_at: String,
    updated_at: String,
    is_deleted: bool,
    sync_version: i64,
}

impl TodoRow {
    fn into_todo(self) -> Result<Todo> {
        let tags = serde_json::from_str(&self.tags).unwrap_or_else(|e| {
            tracing::warn!("todo {} has unreadable tags, treating as empty: {}", self.id, e);
            Vec::new()
        });
        let priority = Priority::try_from(self.priority)
            .map_err(|e| AppError::Internal(format!("todo {}: {}", self.id, e)))?;

        Ok(Todo {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            completed: self.completed,
            priority,
            due_date: parse_optional_timestamp(self.due_date)?,
            tags,
            category_id: self.category_id,
            reminder: parse_optional_timestamp(self.reminder)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            is_deleted: self.is_deleted,
            sync_version: self.sync_version,
        })
    }
}
