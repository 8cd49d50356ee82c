use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{epoch_ms_serde, millis_floor};

/// Global display theme. Persisted independently of any user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    Light,
    Dark,
}

impl ThemePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }
}

/// A single to-do item. Owned exclusively by its parent [`TaskList`].
///
/// Serialized with camelCase keys and epoch-millisecond timestamps so records
/// written by earlier clients keep loading unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(with = "epoch_ms_serde")]
    pub created_at: DateTime<Utc>,

    /// Bumped on any mutation of this task.
    #[serde(with = "epoch_ms_serde")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(text: String, now: DateTime<Utc>) -> Self {
        let now = millis_floor(now);
        Self {
            id: Uuid::new_v4(),
            text,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An ordered group of tasks, newest-created first.
///
/// `created_at` is immutable after creation; `updated_at` is bumped on rename,
/// deadline change, and task add/toggle/delete, and only on those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    pub id: Uuid,

    pub title: String,

    #[serde(with = "epoch_ms_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "epoch_ms_serde")]
    pub updated_at: DateTime<Utc>,

    /// Absent in legacy records; defaults to none.
    #[serde(default, with = "epoch_ms_serde::option")]
    pub deadline_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskList {
    pub fn new(title: String, deadline_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let now = millis_floor(now);
        Self {
            id: Uuid::new_v4(),
            title,
            created_at: now,
            updated_at: now,
            deadline_at: deadline_at.map(millis_floor),
            tasks: Vec::new(),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = millis_floor(now);
    }

    pub fn contains_task(&self, task_id: Uuid) -> bool {
        self.tasks.iter().any(|task| task.id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Task, TaskList, ThemePreference};

    #[test]
    fn new_task_starts_incomplete_with_equal_timestamps() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
            .single()
            .expect("valid now");
        let task = Task::new("Write tests".to_string(), now);
        assert!(!task.completed);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn legacy_record_without_deadline_defaults_to_none() {
        let raw = r#"{
            "id": "6e9cfc8e-31b5-4a73-9c5e-1d0a3c2f9ab1",
            "title": "Inbox",
            "createdAt": 1700000000000,
            "updatedAt": 1700000001000,
            "tasks": []
        }"#;
        let list: TaskList = serde_json::from_str(raw).expect("legacy list parses");
        assert!(list.deadline_at.is_none());
        assert!(list.tasks.is_empty());
    }

    #[test]
    fn task_round_trips_through_camel_case_json() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
            .single()
            .expect("valid now");
        let task = Task::new("Ship it".to_string(), now);
        let raw = serde_json::to_string(&task).expect("serialize task");
        assert!(raw.contains("\"createdAt\""));
        assert!(raw.contains("\"completed\":false"));
        let back: Task = serde_json::from_str(&raw).expect("deserialize task");
        assert_eq!(back, task);
    }

    #[test]
    fn theme_parse_rejects_unknown_values() {
        assert_eq!(ThemePreference::parse(" DARK "), Some(ThemePreference::Dark));
        assert_eq!(ThemePreference::parse("solarized"), None);
        assert_eq!(ThemePreference::default(), ThemePreference::Light);
    }
}
