//! Typed payloads for the three event topics.
//!
//! Decoders are strict about the fields handlers rely on and lenient about
//! everything else: unknown fields are ignored, optional snapshot fields
//! default. An unknown `event_type` fails decoding, which the consumer
//! runtime treats as a bad event (ack + log).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::models::{NotificationType, Priority, Reminder, Task};

/// Task lifecycle event kinds, as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEventKind {
    #[serde(rename = "task.created")]
    Created,
    #[serde(rename = "task.updated")]
    Updated,
    #[serde(rename = "task.completed")]
    Completed,
    #[serde(rename = "task.deleted")]
    Deleted,
}

impl TaskEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventKind::Created => "task.created",
            TaskEventKind::Updated => "task.updated",
            TaskEventKind::Completed => "task.completed",
            TaskEventKind::Deleted => "task.deleted",
        }
    }

    /// The audit action mirrored onto the `audit-logs` topic.
    pub fn action(&self) -> &'static str {
        match self {
            TaskEventKind::Created => "created",
            TaskEventKind::Updated => "updated",
            TaskEventKind::Completed => "completed",
            TaskEventKind::Deleted => "deleted",
        }
    }
}

/// The task snapshot carried inside every task event. Taken from the row
/// as committed by the mutation the event describes.
///
/// Only `id` and `title` are required on read; consumers fall back to the
/// event-level `user_id` when the snapshot omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        TaskSnapshot {
            id: task.id.clone(),
            title: task.title.clone(),
            user_id: Some(task.user_id.clone()),
            description: task.description.clone(),
            is_complete: task.is_complete,
            priority: task.priority,
            due_date: task.due_date,
            category_id: task.category_id.clone(),
            created_at: Some(task.created_at),
            updated_at: Some(task.updated_at),
        }
    }
}

/// Payload published on `task-events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    #[serde(rename = "event_type")]
    pub kind: TaskEventKind,
    pub task_id: String,
    pub task_data: TaskSnapshot,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TaskEvent {
    pub fn new(kind: TaskEventKind, task: &Task) -> Self {
        TaskEvent {
            kind,
            task_id: task.id.clone(),
            task_data: TaskSnapshot::from(task),
            user_id: task.user_id.clone(),
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn decode(payload: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload)
    }
}

/// Wire type of every reminder event.
pub const REMINDER_DUE: &str = "reminder.due";

/// Payload published on `reminders` when a reminder comes due.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderEvent {
    pub reminder_id: String,
    pub task_id: String,
    pub task_title: String,
    pub user_id: String,
    pub remind_at: DateTime<Utc>,
    pub notification_type: NotificationType,
    pub timestamp: DateTime<Utc>,
}

impl ReminderEvent {
    pub fn new(reminder: &Reminder, task: &Task) -> Self {
        ReminderEvent {
            reminder_id: reminder.id.clone(),
            task_id: task.id.clone(),
            task_title: task.title.clone(),
            user_id: task.user_id.clone(),
            remind_at: reminder.remind_at,
            notification_type: reminder.notification_type,
            timestamp: Utc::now(),
        }
    }

    pub fn decode(payload: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload)
    }
}

/// Payload published on `audit-logs`, mirroring every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,
    pub resource_type: String,
    pub resource_id: String,
    pub user_id: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Value>,
}

impl AuditEvent {
    pub fn for_task(kind: TaskEventKind, task_id: &str, user_id: &str) -> Self {
        AuditEvent {
            event_type: format!("audit.task.{}", kind.action()),
            resource_type: "task".to_string(),
            resource_id: task_id.to_string(),
            user_id: user_id.to_string(),
            action: kind.action().to_string(),
            timestamp: Utc::now(),
            changes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_task() -> Task {
        let at = Utc.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap();
        Task {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            title: "Standup".to_string(),
            description: Some("weekly sync".to_string()),
            is_complete: false,
            priority: Priority::Medium,
            due_date: None,
            category_id: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn task_event_round_trips_through_json() {
        let event = TaskEvent::new(TaskEventKind::Completed, &sample_task());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "task.completed");
        assert_eq!(value["task_data"]["priority"], "medium");

        let decoded = TaskEvent::decode(value).unwrap();
        assert_eq!(decoded.kind, TaskEventKind::Completed);
        assert_eq!(decoded.task_id, event.task_id);
        assert_eq!(decoded.user_id, event.user_id);
        assert_eq!(decoded.task_data.title, "Standup");
        assert_eq!(decoded.timestamp, event.timestamp);
    }

    #[test]
    fn snapshot_defaults_apply_to_sparse_payloads() {
        let payload = json!({
            "event_type": "task.completed",
            "task_id": "t1",
            "task_data": {"id": "t1", "title": "Standup", "user_id": "u1", "priority": "medium"},
            "user_id": "u1",
            "timestamp": "2026-02-02T09:00:00Z"
        });

        let event = TaskEvent::decode(payload).unwrap();
        assert!(!event.task_data.is_complete);
        assert_eq!(event.task_data.priority, Priority::Medium);
        assert!(event.task_data.created_at.is_none());
    }

    #[test]
    fn unknown_event_type_fails_decoding() {
        let payload = json!({
            "event_type": "task.archived",
            "task_id": "t1",
            "task_data": {"id": "t1", "title": "x"},
            "user_id": "u1",
            "timestamp": "2026-02-02T09:00:00Z"
        });
        assert!(TaskEvent::decode(payload).is_err());
    }

    #[test]
    fn missing_required_field_fails_decoding() {
        let payload = json!({
            "event_type": "task.completed",
            "task_data": {"id": "t1", "title": "x"},
            "user_id": "u1",
            "timestamp": "2026-02-02T09:00:00Z"
        });
        assert!(TaskEvent::decode(payload).is_err());
    }

    #[test]
    fn reminder_event_serializes_notification_type_snake_case() {
        let task = sample_task();
        let reminder = Reminder {
            id: "r1".to_string(),
            task_id: task.id.clone(),
            remind_at: Utc.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap(),
            notification_type: NotificationType::InApp,
            is_sent: false,
            sent_at: None,
            created_at: Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap(),
        };

        let value = serde_json::to_value(ReminderEvent::new(&reminder, &task)).unwrap();
        assert_eq!(value["notification_type"], "in_app");
        assert_eq!(value["task_title"], "Standup");
        assert!(value["remind_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn audit_event_names_follow_resource_action() {
        let audit = AuditEvent::for_task(TaskEventKind::Deleted, "t1", "u1");
        assert_eq!(audit.event_type, "audit.task.deleted");
        assert_eq!(audit.resource_type, "task");
        assert_eq!(audit.action, "deleted");
        let value = serde_json::to_value(&audit).unwrap();
        assert!(value.get("changes").is_none());
    }
}
