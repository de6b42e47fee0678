use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

/// User-defined task category. Color is a `#rrggbb` hex code used for the
/// badge in clients.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskCategory {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskCategory {
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "#3b82f6".to_string()
}

/// Strip whitespace and angle brackets from a category name; 1..50 chars.
pub fn sanitize_category_name(raw: &str) -> AppResult<String> {
    let cleaned: String = raw.trim().replace(['<', '>'], "");
    if cleaned.is_empty() {
        return Err(AppError::Validation(
            "Category name cannot be empty".to_string(),
        ));
    }
    if cleaned.chars().count() > 50 {
        return Err(AppError::Validation(
            "Category name must be at most 50 characters".to_string(),
        ));
    }
    Ok(cleaned)
}

/// Validate a `#RRGGBB` color code, normalizing to lowercase.
pub fn validate_color(raw: &str) -> AppResult<String> {
    let v = raw.trim();
    let valid = v.len() == 7
        && v.starts_with('#')
        && v[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(AppError::Validation(
            "Color must be in hex format (#RRGGBB)".to_string(),
        ));
    }
    Ok(v.to_lowercase())
}
