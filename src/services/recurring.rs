//! Recurrence rule management: one active rule per task, cached in the
//! state store under `recurring:<task_id>`.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::dapr::state::{keys, ttl};
use crate::dapr::StateStore;
use crate::db::models::{Frequency, NewRecurringTask, RecurringTask};
use crate::db::{RecurringTaskRepository, TaskRepository};
use crate::error::{AppError, AppResult};
use crate::recurrence;
use crate::AppState;

pub struct RecurringService {
    pool: SqlitePool,
    state_store: StateStore,
}

impl RecurringService {
    pub fn new(state: &Arc<AppState>) -> Self {
        RecurringService {
            pool: state.db.clone(),
            state_store: state.state_store.clone(),
        }
    }

    pub async fn create_rule(
        &self,
        user_id: &str,
        task_id: &str,
        input: NewRecurringTask,
    ) -> AppResult<RecurringTask> {
        let task = TaskRepository::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
        if task.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        if RecurringTaskRepository::find_by_task_id(&self.pool, task_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "Task already has a recurring configuration".to_string(),
            ));
        }

        if input.interval < 1 {
            return Err(AppError::Validation(
                "Interval must be at least 1".to_string(),
            ));
        }
        if input.frequency == Frequency::Custom {
            let expr = input.cron_expression.as_deref().ok_or_else(|| {
                AppError::Validation("Cron expression required for custom frequency".to_string())
            })?;
            recurrence::parse_cron(expr)?;
        }

        let next_due_at = recurrence::next_occurrence(
            input.frequency,
            input.interval,
            input.cron_expression.as_deref(),
            Utc::now(),
        )?;

        let rule = RecurringTaskRepository::create(
            &self.pool,
            task_id,
            input.frequency,
            input.interval,
            input.cron_expression,
            next_due_at,
        )
        .await?;

        self.cache_rule(&rule).await;
        Ok(rule)
    }

    pub async fn get_rule(&self, user_id: &str, task_id: &str) -> AppResult<RecurringTask> {
        let task = TaskRepository::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
        if task.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        RecurringTaskRepository::find_by_task_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Task has no recurring configuration".to_string()))
    }

    /// Cancel recurrence for a task. The rule is deactivated, not
    /// deleted, so clients can still read its history until the task
    /// goes away.
    pub async fn cancel_rule(&self, user_id: &str, task_id: &str) -> AppResult<()> {
        let task = TaskRepository::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
        if task.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        let changed = RecurringTaskRepository::deactivate(&self.pool, task_id).await?;
        if !changed {
            return Err(AppError::NotFound(
                "Task has no recurring configuration".to_string(),
            ));
        }

        if let Err(e) = self.state_store.delete(&keys::recurring(task_id)).await {
            tracing::warn!("Failed to invalidate recurrence cache for {}: {}", task_id, e);
        }
        Ok(())
    }

    /// Cache write-through is best-effort; readers fall back to the
    /// database on a miss.
    async fn cache_rule(&self, rule: &RecurringTask) {
        if let Err(e) = self
            .state_store
            .set(&keys::recurring(&rule.task_id), rule, Some(ttl::RECURRING_RULE))
            .await
        {
            tracing::warn!("Failed to cache recurrence rule for {}: {}", rule.task_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewTask, Priority};
    use crate::db::TaskRepository;
    use crate::testutil::test_app_state;
    use chrono::Duration;

    async fn seed_task(state: &Arc<crate::AppState>) -> crate::db::models::Task {
        TaskRepository::create(
            &state.db,
            "u1",
            NewTask {
                title: "Standup".to_string(),
                description: None,
                priority: Priority::Medium,
                due_date: None,
                category_id: None,
            },
        )
        .await
        .unwrap()
    }

    fn weekly() -> NewRecurringTask {
        NewRecurringTask {
            frequency: Frequency::Weekly,
            interval: 1,
            cron_expression: None,
        }
    }

    #[tokio::test]
    async fn create_sets_next_due_and_caches_the_rule() {
        let (state, sidecar) = test_app_state().await;
        let task = seed_task(&state).await;

        let before = Utc::now();
        let rule = RecurringService::new(&state)
            .create_rule("u1", &task.id, weekly())
            .await
            .unwrap();

        assert!(rule.is_active);
        let next_due = rule.next_due_at.unwrap();
        assert!(next_due >= before + Duration::weeks(1));

        let cached = sidecar
            .state_value(&keys::recurring(&task.id))
            .await
            .expect("rule cached");
        assert_eq!(cached["task_id"], *task.id);
    }

    #[tokio::test]
    async fn second_rule_for_the_same_task_conflicts() {
        let (state, _sidecar) = test_app_state().await;
        let task = seed_task(&state).await;
        let service = RecurringService::new(&state);

        service.create_rule("u1", &task.id, weekly()).await.unwrap();
        let result = service.create_rule("u1", &task.id, weekly()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn custom_frequency_requires_a_valid_cron() {
        let (state, _sidecar) = test_app_state().await;
        let task = seed_task(&state).await;
        let service = RecurringService::new(&state);

        let missing = NewRecurringTask {
            frequency: Frequency::Custom,
            interval: 1,
            cron_expression: None,
        };
        assert!(matches!(
            service.create_rule("u1", &task.id, missing).await,
            Err(AppError::Validation(_))
        ));

        let invalid = NewRecurringTask {
            frequency: Frequency::Custom,
            interval: 1,
            cron_expression: Some("every monday".to_string()),
        };
        assert!(matches!(
            service.create_rule("u1", &task.id, invalid).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn cancel_deactivates_and_invalidates_the_cache() {
        let (state, sidecar) = test_app_state().await;
        let task = seed_task(&state).await;
        let service = RecurringService::new(&state);

        service.create_rule("u1", &task.id, weekly()).await.unwrap();
        service.cancel_rule("u1", &task.id).await.unwrap();

        let rule = service.get_rule("u1", &task.id).await.unwrap();
        assert!(!rule.is_active);
        assert!(sidecar
            .state_value(&keys::recurring(&task.id))
            .await
            .is_none());
    }
}
