//! Per-user settings persistence
//!
//! One row per owner, created with defaults the first time it is read.

use sqlx::{SqliteConnection, SqlitePool};

use super::clock::VersionAllocator;
use super::models::{SettingsFields, SettingsPatch, Theme, UserSettings};
use super::{ensure_version, format_timestamp, now, parse_timestamp};
use crate::error::{AppError, Result};

const SETTINGS_COLUMNS: &str =
    "owner_id, theme, notification_time, language, timezone, created_at, updated_at, sync_version";

pub struct SettingsRepository<'a> {
    pool: &'a SqlitePool,
    clock: VersionAllocator,
}

impl<'a> SettingsRepository<'a> {
    pub fn new(pool: &'a SqlitePool, clock: VersionAllocator) -> Self {
        Self { pool, clock }
    }

    pub async fn find(&self, owner_id: i64) -> Result<Option<UserSettings>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, owner_id).await
    }

    /// Read the owner's settings, inserting the defaults if there are none yet
    pub async fn get_or_create(&self, owner_id: i64) -> Result<UserSettings> {
        if let Some(settings) = self.find(owner_id).await? {
            return Ok(settings);
        }

        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;
        let stamp = format_timestamp(&now());
        let defaults = SettingsFields::default();

        // Another request may have created the row in the meantime
        sqlx::query(
            r#"
            INSERT INTO user_settings (
                owner_id, theme, notification_time, language, timezone,
                created_at, updated_at, sync_version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id) DO NOTHING
            "#,
        )
        .bind(owner_id)
        .bind(defaults.theme.as_str())
        .bind(&defaults.notification_time)
        .bind(&defaults.language)
        .bind(&defaults.timezone)
        .bind(&stamp)
        .bind(&stamp)
        .bind(version)
        .execute(&mut *tx)
        .await?;

        let settings = fetch(&mut tx, owner_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("settings for {owner_id} vanished")))?;
        tx.commit().await?;

        tracing::info!(owner_id, version, "created default settings");
        Ok(settings)
    }

    /// Apply a partial update, creating the row from defaults if needed
    pub async fn update(&self, owner_id: i64, patch: SettingsPatch) -> Result<UserSettings> {
        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;

        let mut fields = fetch(&mut tx, owner_id)
            .await?
            .map(|s| s.fields())
            .unwrap_or_default();
        patch.apply_to(&mut fields)?;

        let settings = upsert(&mut tx, owner_id, &fields, version).await?;
        tx.commit().await?;
        Ok(settings)
    }

    /// Overwrite every settings field.
    ///
    /// `expected_version` guards against a concurrent write: 0 means "no row
    /// yet", any other value must match the stored version, else `Conflict`.
    pub async fn save_fields(
        &self,
        owner_id: i64,
        fields: &SettingsFields,
        expected_version: Option<i64>,
    ) -> Result<UserSettings> {
        let mut tx = self.pool.begin().await?;
        let version = self.clock.next_version(&mut tx, owner_id).await?;

        let found = fetch(&mut tx, owner_id).await?.map_or(0, |s| s.sync_version);
        ensure_version("settings of owner", owner_id, found, expected_version)?;

        let settings = upsert(&mut tx, owner_id, fields, version).await?;
        tx.commit().await?;
        Ok(settings)
    }

    /// The settings row, only if it was stamped after `since`
    pub async fn changed_since(&self, owner_id: i64, since: i64) -> Result<Option<UserSettings>> {
        Ok(self
            .find(owner_id)
            .await?
            .filter(|s| s.sync_version > since))
    }
}

/// Insert or overwrite, keeping the original `created_at`
async fn upsert(
    conn: &mut SqliteConnection,
    owner_id: i64,
    fields: &SettingsFields,
    version: i64,
) -> Result<UserSettings> {
    let stamp = format_timestamp(&now());
    let sql = format!(
        "INSERT INTO user_settings ( \
             owner_id, theme, notification_time, language, timezone, \
             created_at, updated_at, sync_version \
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(owner_id) DO UPDATE SET \
             theme = excluded.theme, \
             notification_time = excluded.notification_time, \
             language = excluded.language, \
             timezone = excluded.timezone, \
             updated_at = excluded.updated_at, \
             sync_version = excluded.sync_version \
         RETURNING {SETTINGS_COLUMNS}"
    );
    let row = sqlx::query_as::<_, SettingsRow>(&sql)
        .bind(owner_id)
        .bind(fields.theme.as_str())
        .bind(&fields.notification_time)
        .bind(&fields.language)
        .bind(&fields.timezone)
        .bind(&stamp)
        .bind(&stamp)
        .bind(version)
        .fetch_one(conn)
        .await?;

    tracing::debug!(owner_id, version, "saved settings");
    row.into_settings()
}

async fn fetch(conn: &mut SqliteConnection, owner_id: i64) -> Result<Option<UserSettings>> {
    let sql = format!("SELECT {SETTINGS_COLUMNS} FROM user_settings WHERE owner_id = ?");
    sqlx::query_as::<_, SettingsRow>(&sql)
        .bind(owner_id)
        .fetch_optional(conn)
        .await?
        .map(SettingsRow::into_settings)
        .transpose()
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    owner_id: i64,
    theme: String,
    notification_time: String,
    language: String,
    timezone: String,
    created_at: String,
    updated_at: String,
    sync_version: i64,
}

impl SettingsRow {
    fn into_settings(self) -> Result<UserSettings> {
        let theme = self.theme.parse::<Theme>().unwrap_or_else(|_| {
            tracing::warn!("settings for {} have unknown theme {:?}", self.owner_id, self.theme);
            Theme::default()
        });

        Ok(UserSettings {
            owner_id: self.owner_id,
            theme,
            notification_time: self.notification_time,
            language: self.language,
            timezone: self.timezone,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            sync_version: self.sync_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_lazy_defaults() {
        let pool = test_pool().await;
        let repo = SettingsRepository::new(&pool, VersionAllocator::default());

        assert!(repo.find(1).await.unwrap().is_none());

        let settings = repo.get_or_create(1).await.unwrap();
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.notification_time, "09:00:00");
        assert_eq!(settings.language, "zh-CN");
        assert_eq!(settings.timezone, "Asia/Shanghai");
        assert_eq!(settings.sync_version, 1);

        // A second read does not stamp again
        let again = repo.get_or_create(1).await.unwrap();
        assert_eq!(again, settings);
    }

    #[tokio::test]
    async fn test_update_keeps_created_at() {
        let pool = test_pool().await;
        let repo = SettingsRepository::new(&pool, VersionAllocator::default());

        let before = repo.get_or_create(7).await.unwrap();
        let after = repo
            .update(
                7,
                SettingsPatch {
                    theme: Some("dark".into()),
                    timezone: Some("Europe/Berlin".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(after.theme, Theme::Dark);
        assert_eq!(after.timezone, "Europe/Berlin");
        assert_eq!(after.language, before.language);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.sync_version > before.sync_version);
    }

    #[tokio::test]
    async fn test_changed_since() {
        let pool = test_pool().await;
        let repo = SettingsRepository::new(&pool, VersionAllocator::default());

        assert!(repo.changed_since(3, 0).await.unwrap().is_none());

        let s = repo.get_or_create(3).await.unwrap();
        assert!(repo.changed_since(3, 0).await.unwrap().is_some());
        assert!(repo.changed_since(3, s.sync_version).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_guarded_by_version() {
        let pool = test_pool().await;
        let repo = SettingsRepository::new(&pool, VersionAllocator::default());

        let dark = SettingsFields {
            theme: Theme::Dark,
            ..Default::default()
        };

        // 0 means the caller saw no row
        let first = repo.save_fields(4, &dark, Some(0)).await.unwrap();
        assert!(matches!(
            repo.save_fields(4, &dark, Some(0)).await,
            Err(AppError::Conflict(_))
        ));

        let second = repo
            .save_fields(4, &SettingsFields::default(), Some(first.sync_version))
            .await
            .unwrap();
        assert_eq!(second.theme, Theme::Light);
        assert_eq!(second.created_at, first.created_at);

        assert!(matches!(
            repo.save_fields(4, &dark, Some(first.sync_version)).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(repo.find(4).await.unwrap().unwrap(), second);
    }
}
