use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{NewTask, Task};
use crate::error::{AppError, AppResult};

pub struct TaskRepository;

impl TaskRepository {
    /// Insert a new task row. Input is expected to be sanitized by the
    /// caller.
    pub async fn create(pool: &SqlitePool, user_id: &str, input: NewTask) -> AppResult<Task> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let row = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (
                id, user_id, title, description, is_complete, priority,
                due_date, category_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING
                id, user_id, title, description, is_complete, priority,
                due_date, category_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(input.title)
        .bind(input.description)
        .bind(false)
        .bind(input.priority)
        .bind(input.due_date)
        .bind(input.category_id)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(
            r#"
            SELECT
                id, user_id, title, description, is_complete, priority,
                due_date, category_id, created_at, updated_at
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn list_by_user(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(
            r#"
            SELECT
                id, user_id, title, description, is_complete, priority,
                due_date, category_id, created_at, updated_at
            FROM tasks
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Write the mutable fields of a task back to its row.
    pub async fn update(pool: &SqlitePool, task: &Task) -> AppResult<Task> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, priority = ?, due_date = ?,
                category_id = ?, updated_at = ?
            WHERE id = ?
            RETURNING
                id, user_id, title, description, is_complete, priority,
                due_date, category_id, created_at, updated_at
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority)
        .bind(task.due_date)
        .bind(&task.category_id)
        .bind(now)
        .bind(&task.id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Flip `is_complete` false -> true. Returns `None` when the task was
    /// already complete (or does not exist), so callers can detect the
    /// transition and publish accordingly.
    pub async fn mark_complete(
        pool: &SqlitePool,
        id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET is_complete = 1, updated_at = ?
            WHERE id = ? AND is_complete = 0
            RETURNING
                id, user_id, title, description, is_complete, priority,
                due_date, category_id, created_at, updated_at
            "#,
        )
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Delete a task row. Idempotent; returns whether a row was removed.
    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
