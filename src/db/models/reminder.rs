use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Notification delivery channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationType {
    Email,
    Push,
    InApp,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "email",
            NotificationType::Push => "push",
            NotificationType::InApp => "in_app",
        }
    }
}

/// A scheduled reminder. Transitions `pending -> sent` exactly once; the
/// sweep's conditional update on `is_sent` is the claim, so a sent row is
/// never re-published.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub task_id: String,
    pub remind_at: DateTime<Utc>,
    pub notification_type: NotificationType,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for scheduling a reminder.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReminder {
    pub remind_at: DateTime<Utc>,
    #[serde(default = "default_notification_type")]
    pub notification_type: NotificationType,
}

fn default_notification_type() -> NotificationType {
    NotificationType::InApp
}
