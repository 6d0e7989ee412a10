//! Entity types and request payloads for todos, categories and settings

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};

/// Todo priority, stored as its ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Priority {
    #[default]
    Low = 0,
    Medium = 1,
    High = 2,
    Urgent = 3,
}

impl TryFrom<i64> for Priority {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Urgent),
            other => Err(AppError::invalid(format!(
                "priority must be between 0 and 3, got {other}"
            ))),
        }
    }
}

impl From<Priority> for i64 {
    fn from(p: Priority) -> Self {
        p as i64
    }
}

/// UI theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Auto,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Auto => "auto",
        }
    }
}

impl FromStr for Theme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "auto" => Ok(Theme::Auto),
            other => Err(AppError::invalid(format!("invalid theme: {other:?}"))),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a client-supplied RFC3339 timestamp; anything unparseable counts as absent
pub fn parse_client_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalize a notification time to `HH:MM:SS`
pub fn normalize_notification_time(raw: &str) -> Result<String> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map(|t| t.format("%H:%M:%S").to_string())
        .map_err(|_| AppError::invalid(format!("invalid notification time: {raw:?}")))
}

// ===== Todos =====

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Todo {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub category_id: Option<i64>,
    pub reminder: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub sync_version: i64,
}

impl Todo {
    /// The client-writable part of this todo
    pub fn fields(&self) -> TodoFields {
        TodoFields {
            title: self.title.clone(),
            description: self.description.clone(),
            completed: self.completed,
            priority: self.priority,
            due_date: self.due_date,
            tags: self.tags.clone(),
            category_id: self.category_id,
            reminder: self.reminder,
            is_deleted: self.is_deleted,
        }
    }
}

/// Full set of client-writable todo fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TodoFields {
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub category_id: Option<i64>,
    pub reminder: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

/// Create todo request
#[derive(Debug, Clone, Deserialize)]
pub struct NewTodo {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<i64>,
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub category_id: Option<i64>,
    pub reminder: Option<String>,
}

impl NewTodo {
    pub fn into_fields(self) -> Result<TodoFields> {
        if self.title.trim().is_empty() {
            return Err(AppError::invalid("title must not be empty"));
        }

        Ok(TodoFields {
            priority: self.priority.map(Priority::try_from).transpose()?.unwrap_or_default(),
            due_date: parse_client_timestamp(self.due_date.as_deref()),
            reminder: parse_client_timestamp(self.reminder.as_deref()),
            title: self.title,
            description: self.description,
            completed: false,
            tags: self.tags,
            category_id: self.category_id,
            is_deleted: false,
        })
    }
}

/// Partial todo update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<i64>,
    pub due_date: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Absent leaves the category alone, `null` clears it
    #[serde(default, deserialize_with = "present")]
    pub category_id: Option<Option<i64>>,
    pub reminder: Option<String>,
}

/// Distinguish an explicit `null` from a missing field
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TodoPatch {
    pub fn apply_to(self, fields: &mut TodoFields) -> Result<()> {
        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err(AppError::invalid("title must not be empty"));
            }
            fields.title = title;
        }
        if let Some(description) = self.description {
            fields.description = description;
        }
        if let Some(completed) = self.completed {
            fields.completed = completed;
        }
        if let Some(priority) = self.priority {
            fields.priority = Priority::try_from(priority)?;
        }
        if let Some(tags) = self.tags {
            fields.tags = tags;
        }
        if let Some(category_id) = self.category_id {
            fields.category_id = category_id;
        }
        // A present but unparseable date clears the field
        if let Some(due_date) = self.due_date {
            fields.due_date = parse_client_timestamp(Some(&due_date));
        }
        if let Some(reminder) = self.reminder {
            fields.reminder = parse_client_timestamp(Some(&reminder));
        }
        Ok(())
    }
}

// ===== Categories =====

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub sync_version: i64,
}

impl Category {
    pub fn fields(&self) -> CategoryFields {
        CategoryFields {
            name: self.name.clone(),
            color: self.color.clone(),
            icon: self.icon.clone(),
            is_deleted: self.is_deleted,
        }
    }
}

pub const DEFAULT_CATEGORY_COLOR: &str = "#2196F3";
pub const DEFAULT_CATEGORY_ICON: &str = "folder";

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFields {
    pub name: String,
    pub color: String,
    pub icon: String,
    pub is_deleted: bool,
}

impl CategoryFields {
    /// Fill blank color/icon with defaults and reject a blank name
    pub fn normalized(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(AppError::invalid("category name must not be empty"));
        }
        if self.color.trim().is_empty() {
            self.color = DEFAULT_CATEGORY_COLOR.to_string();
        }
        if self.icon.trim().is_empty() {
            self.icon = DEFAULT_CATEGORY_ICON.to_string();
        }
        Ok(self)
    }
}

/// Create category request
#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
}

impl NewCategory {
    pub fn into_fields(self) -> Result<CategoryFields> {
        CategoryFields {
            name: self.name,
            color: self.color,
            icon: self.icon,
            is_deleted: false,
        }
        .normalized()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

impl CategoryPatch {
    pub fn apply_to(self, fields: &mut CategoryFields) -> Result<()> {
        let mut next = fields.clone();
        if let Some(name) = self.name {
            next.name = name;
        }
        if let Some(color) = self.color {
            next.color = color;
        }
        if let Some(icon) = self.icon {
            next.icon = icon;
        }
        *fields = next.normalized()?;
        Ok(())
    }
}

// ===== User settings =====

pub const DEFAULT_NOTIFICATION_TIME: &str = "09:00:00";
pub const DEFAULT_LANGUAGE: &str = "zh-CN";
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSettings {
    pub owner_id: i64,
    pub theme: Theme,
    pub notification_time: String,
    pub language: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_version: i64,
}

impl UserSettings {
    pub fn fields(&self) -> SettingsFields {
        SettingsFields {
            theme: self.theme,
            notification_time: self.notification_time.clone(),
            language: self.language.clone(),
            timezone: self.timezone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsFields {
    pub theme: Theme,
    pub notification_time: String,
    pub language: String,
    pub timezone: String,
}

impl Default for SettingsFields {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            notification_time: DEFAULT_NOTIFICATION_TIME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

/// Partial settings update; empty strings are treated as absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub theme: Option<String>,
    pub notification_time: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
}

impl SettingsPatch {
    pub fn apply_to(self, fields: &mut SettingsFields) -> Result<()> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        if let Some(theme) = present(self.theme) {
            fields.theme = theme.parse()?;
        }
        if let Some(time) = present(self.notification_time) {
            fields.notification_time = normalize_notification_time(&time)?;
        }
        if let Some(language) = present(self.language) {
            fields.language = language;
        }
        if let Some(timezone) = present(self.timezone) {
            fields.timezone = timezone;
        }
        Ok(())
    }
}
