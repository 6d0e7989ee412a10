//! Sync wire types
//!
//! Defines the JSON shapes exchanged with offline clients:
//! - Sync items for todos, categories and settings
//! - Pull (incremental read) request/response
//! - Batch push request/response and per-item results

use serde::{Deserialize, Serialize};

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// A todo as carried by the sync protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoSyncItem {
    /// Server id; 0 or absent means "create"
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    /// Last server version the client saw for this row
    #[serde(default)]
    pub sync_version: i64,
    /// Last modification time the client saw, RFC3339
    #[serde(default)]
    pub updated_at: String,
}

/// A category as carried by the sync protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySyncItem {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub sync_version: i64,
    #[serde(default)]
    pub updated_at: String,
}

/// User settings as carried by the sync protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSyncItem {
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub notification_time: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub sync_version: i64,
    #[serde(default)]
    pub updated_at: String,
}

/// Kinds of entities that take part in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Todo,
    Category,
    Settings,
}

/// Outcome of reconciling one pushed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
    Deleted,
    Conflict,
    Error,
}

impl SyncAction {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncAction::Created | SyncAction::Updated | SyncAction::Deleted)
    }
}

/// Per-item result of a batch push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// The id the client submitted
    #[serde(default, skip_serializing_if = "is_zero")]
    pub local_id: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub server_id: i64,
    pub action: SyncAction,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Server version after the operation (or the winning version on conflict)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub sync_version: i64,
}

impl SyncResult {
    pub fn applied(
        kind: EntityKind,
        action: SyncAction,
        local_id: i64,
        server_id: i64,
        sync_version: i64,
    ) -> Self {
        Self {
            kind,
            local_id,
            server_id,
            action,
            message: String::new(),
            sync_version,
        }
    }

    pub fn conflict(kind: EntityKind, local_id: i64, server_id: i64, server_version: i64) -> Self {
        Self {
            kind,
            local_id,
            server_id,
            action: SyncAction::Conflict,
            message: "server has newer version".to_string(),
            sync_version: server_version,
        }
    }

    pub fn error(kind: EntityKind, local_id: i64, message: impl Into<String>) -> Self {
        Self {
            kind,
            local_id,
            server_id: 0,
            action: SyncAction::Error,
            message: message.into(),
            sync_version: 0,
        }
    }
}

/// Request for everything changed after `since`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub since: i64,
}

/// Changes after the requested version plus the current ceiling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub todos: Vec<TodoSyncItem>,
    pub categories: Vec<CategorySyncItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsSyncItem>,
    pub server_version: i64,
}

/// Client changes to push
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSyncRequest {
    #[serde(default)]
    pub todos: Vec<TodoSyncItem>,
    #[serde(default)]
    pub categories: Vec<CategorySyncItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsSyncItem>,
}

/// Batch push results, bucketed by outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSyncResponse {
    pub success: Vec<SyncResult>,
    pub conflicts: Vec<SyncResult>,
    pub errors: Vec<SyncResult>,
}

/// Current server version for the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_without_id() {
        let item: TodoSyncItem = serde_json::from_str(
            r#"{"title":"offline todo","priority":1,"tags":["a"],"sync_version":0,"updated_at":""}"#,
        )
        .unwrap();
        assert_eq!(item.id, 0);
        assert!(!item.is_deleted);
        assert!(item.due_date.is_none());
    }

    #[test]
    fn test_sync_result_omits_empty_fields() {
        let result = SyncResult::error(EntityKind::Category, 4, "not found");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["type"], "category");
        assert_eq!(json["action"], "error");
        assert_eq!(json["local_id"], 4);
        assert!(json.get("server_id").is_none());
        assert!(json.get("sync_version").is_none());
    }

    #[test]
    fn test_pull_response_omits_missing_settings() {
        let response = PullResponse {
            todos: vec![],
            categories: vec![],
            settings: None,
            server_version: 12,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"todos":[],"categories":[],"server_version":12}"#);
    }
}
