//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Per-owner version clock
CREATE TABLE IF NOT EXISTS sync_clocks (
    owner_id INTEGER PRIMARY KEY,
    version INTEGER NOT NULL DEFAULT 0
);

-- Categories table
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    color TEXT NOT NULL DEFAULT '#2196F3',
    icon TEXT NOT NULL DEFAULT 'folder',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    sync_version INTEGER NOT NULL DEFAULT 0
);

-- Names only need to be unique among live categories
CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_owner_name
    ON categories(owner_id, name) WHERE is_deleted = 0;
CREATE INDEX IF NOT EXISTS idx_categories_owner_version ON categories(owner_id, sync_version);

-- User settings table (one row per owner)
CREATE TABLE IF NOT EXISTS user_settings (
    owner_id INTEGER PRIMARY KEY,
    theme TEXT NOT NULL DEFAULT 'light' CHECK (theme IN ('light', 'dark', 'auto')),
    notification_time TEXT NOT NULL DEFAULT '09:00:00',
    language TEXT NOT NULL DEFAULT 'zh-CN',
    timezone TEXT NOT NULL DEFAULT 'Asia/Shanghai',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    sync_version INTEGER NOT NULL DEFAULT 0
);

-- Todos table
CREATE TABLE IF NOT EXISTS todos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    completed INTEGER NOT NULL DEFAULT 0,
    priority INTEGER NOT NULL DEFAULT 0 CHECK (priority >= 0 AND priority <= 3),
    due_date TEXT,
    -- JSON array of strings
    tags TEXT NOT NULL DEFAULT '[]',
    category_id INTEGER REFERENCES categories(id),
    reminder TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    sync_version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_todos_owner_created ON todos(owner_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_todos_owner_version ON todos(owner_id, sync_version);
CREATE INDEX IF NOT EXISTS idx_todos_category ON todos(category_id) WHERE category_id IS NOT NULL;
"#;
