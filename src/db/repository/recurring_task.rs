use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{Frequency, RecurringTask, Task};
use crate::error::{AppError, AppResult};

pub struct RecurringTaskRepository;

impl RecurringTaskRepository {
    pub async fn create(
        pool: &SqlitePool,
        task_id: &str,
        frequency: Frequency,
        interval: u32,
        cron_expression: Option<String>,
        next_due_at: DateTime<Utc>,
    ) -> AppResult<RecurringTask> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let row = sqlx::query_as::<_, RecurringTask>(
            r#"
            INSERT INTO recurring_tasks (
                id, task_id, frequency, interval, cron_expression,
                next_due_at, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            RETURNING
                id, task_id, frequency, interval, cron_expression,
                next_due_at, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(task_id)
        .bind(frequency)
        .bind(interval)
        .bind(cron_expression)
        .bind(next_due_at)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_task_id(
        pool: &SqlitePool,
        task_id: &str,
    ) -> AppResult<Option<RecurringTask>> {
        let row = sqlx::query_as::<_, RecurringTask>(
            r#"
            SELECT
                id, task_id, frequency, interval, cron_expression,
                next_due_at, is_active, created_at, updated_at
            FROM recurring_tasks
            WHERE task_id = ?
            "#,
        )
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Insert the spawned task instance and advance the rule's
    /// `next_due_at` atomically. Both writes commit or neither does.
    pub async fn spawn_next(
        pool: &SqlitePool,
        rule_id: &str,
        new_task: &Task,
        next_due_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let now = Utc::now();
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, user_id, title, description, is_complete, priority,
                due_date, category_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_task.id)
        .bind(&new_task.user_id)
        .bind(&new_task.title)
        .bind(&new_task.description)
        .bind(new_task.is_complete)
        .bind(new_task.priority)
        .bind(new_task.due_date)
        .bind(&new_task.category_id)
        .bind(new_task.created_at)
        .bind(new_task.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        // The is_active guard serializes against a concurrent cancel.
        sqlx::query(
            r#"
            UPDATE recurring_tasks
            SET next_due_at = ?, updated_at = ?
            WHERE id = ? AND is_active = 1
            "#,
        )
        .bind(next_due_at)
        .bind(now)
        .bind(rule_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    /// Pause the rule; the next completion of the task will not spawn.
    pub async fn deactivate(pool: &SqlitePool, task_id: &str) -> AppResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE recurring_tasks SET is_active = 0, updated_at = ? WHERE task_id = ?",
        )
        .bind(now)
        .bind(task_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove the rule entirely (task deletion cascade). Idempotent.
    pub async fn delete_by_task_id(pool: &SqlitePool, task_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM recurring_tasks WHERE task_id = ?")
            .bind(task_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
