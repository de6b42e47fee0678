//! Task mutations. Every committed mutation hands the post-commit row to
//! the lifecycle publisher; publish failures never surface to the caller.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::dapr::state::keys;
use crate::dapr::StateStore;
use crate::db::models::{sanitize_description, sanitize_title, NewTask, Task, TaskPatch};
use crate::db::{CategoryRepository, RecurringTaskRepository, TaskRepository};
use crate::error::{AppError, AppResult};
use crate::events::publisher::EventPublisher;
use crate::events::schemas::TaskEventKind;
use crate::AppState;

pub struct TaskService {
    pool: SqlitePool,
    state_store: StateStore,
    publisher: Arc<EventPublisher>,
}

impl TaskService {
    pub fn new(state: &Arc<AppState>) -> Self {
        TaskService {
            pool: state.db.clone(),
            state_store: state.state_store.clone(),
            publisher: state.publisher.clone(),
        }
    }

    pub async fn create_task(&self, user_id: &str, mut input: NewTask) -> AppResult<Task> {
        input.title = sanitize_title(&input.title)?;
        input.description = sanitize_description(input.description.as_deref())?;

        if let Some(ref category_id) = input.category_id {
            let category = CategoryRepository::find_by_id(&self.pool, category_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;
            if category.user_id != user_id {
                return Err(AppError::Forbidden);
            }
        }

        let task = TaskRepository::create(&self.pool, user_id, input).await?;
        self.publisher
            .publish_task_event(TaskEventKind::Created, &task);
        Ok(task)
    }

    pub async fn get_task(&self, user_id: &str, task_id: &str) -> AppResult<Task> {
        let task = TaskRepository::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
        if task.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(task)
    }

    pub async fn list_tasks(&self, user_id: &str) -> AppResult<Vec<Task>> {
        TaskRepository::list_by_user(&self.pool, user_id).await
    }

    pub async fn update_task(
        &self,
        user_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> AppResult<Task> {
        let mut task = self.get_task(user_id, task_id).await?;

        if let Some(title) = patch.title {
            task.title = sanitize_title(&title)?;
        }
        if let Some(description) = patch.description {
            task.description = sanitize_description(Some(&description))?;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(category_id) = patch.category_id {
            let category = CategoryRepository::find_by_id(&self.pool, &category_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;
            if category.user_id != user_id {
                return Err(AppError::Forbidden);
            }
            task.category_id = Some(category_id);
        }

        let updated = TaskRepository::update(&self.pool, &task).await?;
        self.publisher
            .publish_task_event(TaskEventKind::Updated, &updated);
        Ok(updated)
    }

    /// Mark a task complete. On the false -> true transition this
    /// publishes `task.updated` followed by `task.completed`; completing
    /// an already-complete task publishes nothing.
    pub async fn complete_task(&self, user_id: &str, task_id: &str) -> AppResult<Task> {
        let task = self.get_task(user_id, task_id).await?;

        match TaskRepository::mark_complete(&self.pool, &task.id, Utc::now()).await? {
            Some(completed) => {
                self.publisher.publish_task_completion(&completed);
                Ok(completed)
            }
            // Already complete; no transition, no events.
            None => Ok(task),
        }
    }

    /// Delete a task. The recurrence rule dies with the task; reminders
    /// stay and are suppressed by the sweep's deleted-task check.
    pub async fn delete_task(&self, user_id: &str, task_id: &str) -> AppResult<()> {
        let task = self.get_task(user_id, task_id).await?;

        RecurringTaskRepository::delete_by_task_id(&self.pool, &task.id).await?;
        if let Err(e) = self.state_store.delete(&keys::recurring(&task.id)).await {
            tracing::warn!("Failed to invalidate recurrence cache for {}: {}", task.id, e);
        }

        TaskRepository::delete(&self.pool, &task.id).await?;
        self.publisher
            .publish_task_event(TaskEventKind::Deleted, &task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Priority;
    use crate::events::TOPIC_TASK_EVENTS;
    use crate::testutil::{test_app_state, wait_for};

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: None,
            priority: Priority::Medium,
            due_date: None,
            category_id: None,
        }
    }

    #[tokio::test]
    async fn create_publishes_a_created_event_with_full_snapshot() {
        let (state, sidecar) = test_app_state().await;
        let service = TaskService::new(&state);

        let task = service.create_task("u1", new_task("Standup")).await.unwrap();

        let observer = sidecar.clone();
        let message = wait_for(move || {
            let observer = observer.clone();
            async move {
                observer
                    .published_on(TOPIC_TASK_EVENTS)
                    .await
                    .into_iter()
                    .find(|m| m.event_type() == "task.created")
            }
        })
        .await;

        assert_eq!(message.data()["task_id"], *task.id);
        assert_eq!(message.data()["task_data"]["title"], "Standup");
        assert_eq!(message.data()["task_data"]["user_id"], "u1");
        assert_eq!(message.data()["user_id"], "u1");
    }

    #[tokio::test]
    async fn completion_publishes_updated_then_completed_in_order() {
        let (state, sidecar) = test_app_state().await;
        let service = TaskService::new(&state);

        let task = service.create_task("u1", new_task("Standup")).await.unwrap();
        let completed = service.complete_task("u1", &task.id).await.unwrap();
        assert!(completed.is_complete);

        let observer = sidecar.clone();
        let types = wait_for(move || {
            let observer = observer.clone();
            async move {
                let types: Vec<String> = observer
                    .published_on(TOPIC_TASK_EVENTS)
                    .await
                    .iter()
                    .map(|m| m.event_type().to_string())
                    .collect();
                (types.len() >= 3).then_some(types)
            }
        })
        .await;

        assert_eq!(types, vec!["task.created", "task.updated", "task.completed"]);
    }

    #[tokio::test]
    async fn completing_twice_publishes_no_second_transition() {
        let (state, sidecar) = test_app_state().await;
        let service = TaskService::new(&state);

        let task = service.create_task("u1", new_task("Standup")).await.unwrap();
        service.complete_task("u1", &task.id).await.unwrap();
        let again = service.complete_task("u1", &task.id).await.unwrap();
        assert!(again.is_complete);

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let count = sidecar.published_on(TOPIC_TASK_EVENTS).await.len();
        // created + updated + completed, nothing from the second call
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn delete_removes_the_rule_and_publishes_deleted() {
        let (state, sidecar) = test_app_state().await;
        let service = TaskService::new(&state);

        let task = service.create_task("u1", new_task("Standup")).await.unwrap();
        crate::db::RecurringTaskRepository::create(
            &state.db,
            &task.id,
            crate::db::models::Frequency::Daily,
            1,
            None,
            chrono::Utc::now(),
        )
        .await
        .unwrap();

        service.delete_task("u1", &task.id).await.unwrap();

        assert!(
            crate::db::RecurringTaskRepository::find_by_task_id(&state.db, &task.id)
                .await
                .unwrap()
                .is_none()
        );

        let observer = sidecar.clone();
        wait_for(move || {
            let observer = observer.clone();
            async move {
                observer
                    .published_on(TOPIC_TASK_EVENTS)
                    .await
                    .into_iter()
                    .find(|m| m.event_type() == "task.deleted")
            }
        })
        .await;
    }

    #[tokio::test]
    async fn ownership_is_enforced_on_every_path() {
        let (state, _sidecar) = test_app_state().await;
        let service = TaskService::new(&state);

        let task = service.create_task("u1", new_task("Mine")).await.unwrap();

        assert!(matches!(
            service.get_task("u2", &task.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            service.complete_task("u2", &task.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            service.delete_task("u2", &task.id).await,
            Err(AppError::Forbidden)
        ));
    }
}
