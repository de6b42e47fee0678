use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

/// Task priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// A user-owned task row. Mutable only through the API; every mutation
/// publishes a lifecycle event carrying the post-commit snapshot.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub is_complete: bool,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task. `title` and `description` are sanitized
/// before insert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
}

/// Partial update for a task; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
}

/// Strip whitespace and angle brackets from a title; 1..200 chars.
pub fn sanitize_title(raw: &str) -> AppResult<String> {
    let cleaned: String = raw.trim().replace(['<', '>'], "");
    if cleaned.is_empty() {
        return Err(AppError::Validation(
            "Title cannot be empty or only whitespace".to_string(),
        ));
    }
    if cleaned.chars().count() > 200 {
        return Err(AppError::Validation(
            "Title must be at most 200 characters".to_string(),
        ));
    }
    Ok(cleaned)
}

/// Strip whitespace and angle brackets from a description; empty becomes
/// `None`; at most 2000 chars.
pub fn sanitize_description(raw: Option<&str>) -> AppResult<Option<String>> {
    let Some(raw) = raw else { return Ok(None) };
    let cleaned: String = raw.trim().replace(['<', '>'], "");
    if cleaned.is_empty() {
        return Ok(None);
    }
    if cleaned.chars().count() > 2000 {
        return Err(AppError::Validation(
            "Description must be at most 2000 characters".to_string(),
        ));
    }
    Ok(Some(cleaned))
}
