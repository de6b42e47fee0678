use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Recurring task frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

/// Recurrence configuration for a task (one active rule per task).
///
/// When the associated task is completed, the recurring worker spawns a
/// fresh instance and advances `next_due_at`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RecurringTask {
    pub id: String,
    pub task_id: String,
    pub frequency: Frequency,
    pub interval: u32,
    pub cron_expression: Option<String>,
    pub next_due_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for setting up a recurrence rule.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecurringTask {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    pub cron_expression: Option<String>,
}

fn default_interval() -> u32 {
    1
}
