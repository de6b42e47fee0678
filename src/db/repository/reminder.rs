use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{NewReminder, Reminder};
use crate::error::{AppError, AppResult};

/// Repository for scheduled reminders.
///
/// The sweep claims due rows with an atomic single-statement
/// `UPDATE ... WHERE id = (SELECT ... LIMIT 1) AND is_sent = 0 RETURNING`.
/// The outer `is_sent = 0` guard means at most one concurrent sweep wins a
/// given row, which is what makes the pending -> sent transition happen
/// exactly once.
pub struct ReminderRepository;

impl ReminderRepository {
    pub async fn create(
        pool: &SqlitePool,
        task_id: &str,
        input: NewReminder,
    ) -> AppResult<Reminder> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let row = sqlx::query_as::<_, Reminder>(
            r#"
            INSERT INTO task_reminders (
                id, task_id, remind_at, notification_type, is_sent, sent_at, created_at
            ) VALUES (?, ?, ?, ?, 0, NULL, ?)
            RETURNING
                id, task_id, remind_at, notification_type, is_sent, sent_at, created_at
            "#,
        )
        .bind(id)
        .bind(task_id)
        .bind(input.remind_at)
        .bind(input.notification_type)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Reminder>> {
        let row = sqlx::query_as::<_, Reminder>(
            r#"
            SELECT
                id, task_id, remind_at, notification_type, is_sent, sent_at, created_at
            FROM task_reminders
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn list_by_task(pool: &SqlitePool, task_id: &str) -> AppResult<Vec<Reminder>> {
        let rows = sqlx::query_as::<_, Reminder>(
            r#"
            SELECT
                id, task_id, remind_at, notification_type, is_sent, sent_at, created_at
            FROM task_reminders
            WHERE task_id = ?
            ORDER BY remind_at ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Claim the earliest due, unsent reminder and mark it sent in the
    /// same statement. Returns `None` when nothing is due. Callers loop
    /// until `None` to drain a tick, which also yields `remind_at` order.
    pub async fn claim_next_due(
        pool: &SqlitePool,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Reminder>> {
        let row = sqlx::query_as::<_, Reminder>(
            r#"
            UPDATE task_reminders
            SET is_sent = 1, sent_at = ?
            WHERE id = (
                SELECT id FROM task_reminders
                WHERE is_sent = 0 AND remind_at <= ?
                ORDER BY remind_at ASC
                LIMIT 1
            ) AND is_sent = 0
            RETURNING
                id, task_id, remind_at, notification_type, is_sent, sent_at, created_at
            "#,
        )
        .bind(now)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Release a claim taken by `claim_next_due` when the publish that
    /// followed it failed, so a later sweep retries the row.
    pub async fn release_claim(pool: &SqlitePool, id: &str) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE task_reminders SET is_sent = 0, sent_at = NULL WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a reminder row. Idempotent.
    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM task_reminders WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
