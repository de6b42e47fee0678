use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::TaskCategory;
use crate::error::{AppError, AppResult};

pub struct CategoryRepository;

impl CategoryRepository {
    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        name: String,
        color: String,
    ) -> AppResult<TaskCategory> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let row = sqlx::query_as::<_, TaskCategory>(
            r#"
            INSERT INTO task_categories (id, user_id, name, color, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, user_id, name, color, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(color)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<TaskCategory>> {
        let row = sqlx::query_as::<_, TaskCategory>(
            "SELECT id, user_id, name, color, created_at FROM task_categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn list_by_user(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<TaskCategory>> {
        let rows = sqlx::query_as::<_, TaskCategory>(
            r#"
            SELECT id, user_id, name, color, created_at
            FROM task_categories
            WHERE user_id = ?
            ORDER BY name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM task_categories WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
