//! Shaping between stored entities and sync wire items

use crate::db::{
    format_timestamp, parse_client_timestamp, Category, CategoryFields, Priority,
    SettingsFields, SettingsPatch, Todo, TodoFields, UserSettings,
};
use crate::error::Result;

use super::reader::SyncSnapshot;
use super::types::{
    BatchSyncResponse, CategorySyncItem, PullResponse, SettingsSyncItem, SyncAction, SyncResult,
    TodoSyncItem,
};

impl From<&Todo> for TodoSyncItem {
    fn from(todo: &Todo) -> Self {
        Self {
            id: todo.id,
            title: todo.title.clone(),
            description: todo.description.clone(),
            completed: todo.completed,
            priority: todo.priority.into(),
            due_date: todo.due_date.as_ref().map(format_timestamp),
            tags: todo.tags.clone(),
            category_id: todo.category_id,
            reminder: todo.reminder.as_ref().map(format_timestamp),
            is_deleted: todo.is_deleted,
            sync_version: todo.sync_version,
            updated_at: format_timestamp(&todo.updated_at),
        }
    }
}

impl From<&Category> for CategorySyncItem {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            color: category.color.clone(),
            icon: category.icon.clone(),
            is_deleted: category.is_deleted,
            sync_version: category.sync_version,
            updated_at: format_timestamp(&category.updated_at),
        }
    }
}

impl From<&UserSettings> for SettingsSyncItem {
    fn from(settings: &UserSettings) -> Self {
        Self {
            theme: settings.theme.to_string(),
            notification_time: settings.notification_time.clone(),
            language: settings.language.clone(),
            timezone: settings.timezone.clone(),
            sync_version: settings.sync_version,
            updated_at: format_timestamp(&settings.updated_at),
        }
    }
}

impl From<SyncSnapshot> for PullResponse {
    fn from(snapshot: SyncSnapshot) -> Self {
        Self {
            todos: snapshot.todos.iter().map(TodoSyncItem::from).collect(),
            categories: snapshot.categories.iter().map(CategorySyncItem::from).collect(),
            settings: snapshot.settings.as_ref().map(SettingsSyncItem::from),
            server_version: snapshot.server_version,
        }
    }
}

impl TodoSyncItem {
    /// Validate and convert the client's field values
    pub fn to_fields(&self) -> Result<TodoFields> {
        Ok(TodoFields {
            title: self.title.clone(),
            description: self.description.clone(),
            completed: self.completed,
            priority: Priority::try_from(self.priority)?,
            due_date: parse_client_timestamp(self.due_date.as_deref()),
            tags: self.tags.clone(),
            category_id: self.category_id,
            reminder: parse_client_timestamp(self.reminder.as_deref()),
            is_deleted: self.is_deleted,
        })
    }
}

impl CategorySyncItem {
    pub fn to_fields(&self) -> Result<CategoryFields> {
        CategoryFields {
            name: self.name.clone(),
            color: self.color.clone(),
            icon: self.icon.clone(),
            is_deleted: self.is_deleted,
        }
        .normalized()
    }
}

impl SettingsSyncItem {
    /// Overlay the client's values on `current`; blank strings keep the current value
    pub fn merge_into(&self, current: SettingsFields) -> Result<SettingsFields> {
        let mut fields = current;
        SettingsPatch {
            theme: Some(self.theme.clone()),
            notification_time: Some(self.notification_time.clone()),
            language: Some(self.language.clone()),
            timezone: Some(self.timezone.clone()),
        }
        .apply_to(&mut fields)?;
        Ok(fields)
    }
}

/// Split batch results into success, conflict and error buckets, keeping order
pub fn partition(results: Vec<SyncResult>) -> BatchSyncResponse {
    let mut response = BatchSyncResponse::default();
    for result in results {
        match result.action {
            SyncAction::Created | SyncAction::Updated | SyncAction::Deleted => {
                response.success.push(result)
            }
            SyncAction::Conflict => response.conflicts.push(result),
            SyncAction::Error => response.errors.push(result),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Theme;
    use crate::error::AppError;
    use crate::sync::types::EntityKind;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_partition_keeps_order() {
        let results = vec![
            SyncResult::applied(EntityKind::Todo, SyncAction::Created, 0, 10, 5),
            SyncResult::conflict(EntityKind::Todo, 3, 3, 9),
            SyncResult::error(EntityKind::Todo, 4, "not found"),
            SyncResult::applied(EntityKind::Category, SyncAction::Deleted, 2, 2, 6),
            SyncResult::applied(EntityKind::Settings, SyncAction::Updated, 0, 0, 7),
        ];

        let response = partition(results);
        let success: Vec<_> = response.success.iter().map(|r| r.kind).collect();
        assert_eq!(
            success,
            vec![EntityKind::Todo, EntityKind::Category, EntityKind::Settings]
        );
        assert_eq!(response.conflicts.len(), 1);
        assert_eq!(response.errors[0].local_id, 4);
    }

    #[test]
    fn test_todo_item_round_trip_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let todo = Todo {
            id: 8,
            owner_id: 1,
            title: "plan trip".into(),
            description: String::new(),
            completed: false,
            priority: Priority::Urgent,
            due_date: Some(ts),
            tags: vec!["travel".into()],
            category_id: Some(3),
            reminder: None,
            created_at: ts,
            updated_at: ts,
            is_deleted: false,
            sync_version: 44,
        };

        let item = TodoSyncItem::from(&todo);
        assert_eq!(item.priority, 3);
        assert_eq!(item.updated_at, "2024-06-01T12:00:00.000Z");
        assert_eq!(item.to_fields().unwrap(), todo.fields());
    }

    #[test]
    fn test_todo_item_rejects_bad_priority() {
        let item = TodoSyncItem {
            id: 0,
            title: "x".into(),
            description: String::new(),
            completed: false,
            priority: 5,
            due_date: Some("soon".into()),
            tags: vec![],
            category_id: None,
            reminder: None,
            is_deleted: false,
            sync_version: 0,
            updated_at: String::new(),
        };
        assert!(matches!(item.to_fields(), Err(AppError::Invalid(_))));
    }

    #[test]
    fn test_settings_merge_keeps_blank_fields() {
        let item = SettingsSyncItem {
            theme: "auto".into(),
            notification_time: String::new(),
            language: "en-US".into(),
            timezone: String::new(),
            sync_version: 1,
            updated_at: String::new(),
        };
        let merged = item.merge_into(SettingsFields::default()).unwrap();
        assert_eq!(merged.theme, Theme::Auto);
        assert_eq!(merged.language, "en-US");
        assert_eq!(merged.notification_time, "09:00:00");
        assert_eq!(merged.timezone, "Asia/Shanghai");
    }
}
