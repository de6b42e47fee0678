//! Recurring-task worker: listens on `task-events` and spawns the next
//! instance when a task with an active recurrence rule is completed.
//!
//! Delivery is at-least-once, so the worker keeps a processing marker in
//! the state store under `recurring-processing:<task_id>`; a redelivery
//! that finds the marker completed acks without side effects.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::consumers::Outcome;
use crate::dapr::state::{
    keys, ttl, ProcessingStatus, RecurringProcessingState, StateStore,
};
use crate::db::models::Task;
use crate::db::RecurringTaskRepository;
use crate::error::AppResult;
use crate::events::publisher::EventPublisher;
use crate::events::schemas::{TaskEvent, TaskEventKind};
use crate::recurrence;
use crate::AppState;

pub struct RecurringTaskConsumer {
    pool: SqlitePool,
    state_store: StateStore,
    publisher: Arc<EventPublisher>,
}

enum Processed {
    /// The marker said this event was already handled.
    Duplicate,
    /// No active rule; nothing to spawn.
    NotRecurring,
    /// A new instance was created.
    Spawned(String),
}

impl RecurringTaskConsumer {
    pub fn new(state: &Arc<AppState>) -> Self {
        RecurringTaskConsumer {
            pool: state.db.clone(),
            state_store: state.state_store.clone(),
            publisher: state.publisher.clone(),
        }
    }

    pub async fn handle(&self, event: &TaskEvent) -> Outcome {
        if event.kind != TaskEventKind::Completed {
            return Outcome::Success;
        }

        match self.process(event).await {
            Ok(Processed::Duplicate) => {
                tracing::debug!(
                    task_id = %event.task_id,
                    "Duplicate completion event, already processed"
                );
                Outcome::Success
            }
            Ok(Processed::NotRecurring) => Outcome::Success,
            Ok(Processed::Spawned(new_task_id)) => {
                tracing::info!(
                    task_id = %event.task_id,
                    new_task_id = %new_task_id,
                    "Spawned next recurring instance"
                );
                Outcome::Success
            }
            Err(e) => {
                self.mark_failed(&event.task_id, &e.to_string()).await;
                Outcome::from_error(&e)
            }
        }
    }

    async fn process(&self, event: &TaskEvent) -> AppResult<Processed> {
        let marker_key = keys::recurring_processing(&event.task_id);

        if let Some(existing) = self
            .state_store
            .get::<RecurringProcessingState>(&marker_key)
            .await?
        {
            if existing.status == ProcessingStatus::Completed {
                return Ok(Processed::Duplicate);
            }
        }

        let started_at = Utc::now();
        self.state_store
            .set(
                &marker_key,
                &RecurringProcessingState {
                    status: ProcessingStatus::Processing,
                    next_task_id: None,
                    started_at,
                    finished_at: None,
                    error_message: None,
                },
                Some(ttl::RECURRING_PROCESSING),
            )
            .await?;

        let rule = RecurringTaskRepository::find_by_task_id(&self.pool, &event.task_id).await?;
        let Some(rule) = rule.filter(|r| r.is_active) else {
            self.mark_completed(&marker_key, started_at, None).await?;
            return Ok(Processed::NotRecurring);
        };

        let next_due_at = recurrence::next_occurrence(
            rule.frequency,
            rule.interval,
            rule.cron_expression.as_deref(),
            Utc::now(),
        )?;

        let snapshot = &event.task_data;
        let now = Utc::now();
        let new_task = Task {
            id: Uuid::new_v4().to_string(),
            user_id: snapshot
                .user_id
                .clone()
                .unwrap_or_else(|| event.user_id.clone()),
            title: snapshot.title.clone(),
            description: snapshot.description.clone(),
            is_complete: false,
            priority: snapshot.priority,
            due_date: None,
            category_id: snapshot.category_id.clone(),
            created_at: now,
            updated_at: now,
        };

        RecurringTaskRepository::spawn_next(&self.pool, &rule.id, &new_task, next_due_at).await?;

        // The cached rule now has a stale next_due_at.
        if let Err(e) = self.state_store.delete(&keys::recurring(&event.task_id)).await {
            tracing::warn!(
                "Failed to invalidate recurrence cache for {}: {}",
                event.task_id,
                e
            );
        }

        self.publisher
            .publish_task_event(TaskEventKind::Created, &new_task);

        self.mark_completed(&marker_key, started_at, Some(new_task.id.clone()))
            .await?;

        Ok(Processed::Spawned(new_task.id))
    }

    async fn mark_completed(
        &self,
        marker_key: &str,
        started_at: chrono::DateTime<Utc>,
        next_task_id: Option<String>,
    ) -> AppResult<()> {
        self.state_store
            .set(
                marker_key,
                &RecurringProcessingState {
                    status: ProcessingStatus::Completed,
                    next_task_id,
                    started_at,
                    finished_at: Some(Utc::now()),
                    error_message: None,
                },
                Some(ttl::RECURRING_PROCESSING),
            )
            .await
    }

    /// Best effort: the redelivery will run regardless of whether this
    /// write lands.
    async fn mark_failed(&self, task_id: &str, message: &str) {
        let marker_key = keys::recurring_processing(task_id);
        let now = Utc::now();
        let result = self
            .state_store
            .set(
                &marker_key,
                &RecurringProcessingState {
                    status: ProcessingStatus::Failed,
                    next_task_id: None,
                    started_at: now,
                    finished_at: Some(now),
                    error_message: Some(message.to_string()),
                },
                Some(ttl::RECURRING_PROCESSING),
            )
            .await;
        if let Err(e) = result {
            tracing::warn!("Failed to record processing failure for {}: {}", task_id, e);
        }
    }
}
