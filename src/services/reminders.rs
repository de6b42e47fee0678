//! Reminder scheduling and the periodic sweep.
//!
//! Scheduling writes a pending row. The sweep claims due rows one at a
//! time (earliest first) via the repository's conditional update, then
//! publishes the `reminder.due` event. Claiming before publishing is what
//! lets several sweep instances run concurrently without double-sending;
//! when the publish itself fails the claim is released so a later tick
//! retries the row.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::dapr::DaprClient;
use crate::db::models::{NewReminder, Reminder};
use crate::db::{ReminderRepository, TaskRepository};
use crate::error::{AppError, AppResult};
use crate::events::schemas::{ReminderEvent, REMINDER_DUE};
use crate::events::TOPIC_REMINDERS;
use crate::AppState;

pub struct ReminderService {
    pool: SqlitePool,
    dapr: Arc<DaprClient>,
}

/// What a single sweep tick did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub published: u32,
    pub suppressed: u32,
    pub failed: u32,
}

impl ReminderService {
    pub fn new(state: &Arc<AppState>) -> Self {
        ReminderService {
            pool: state.db.clone(),
            dapr: state.dapr.clone(),
        }
    }

    /// Schedule a reminder for a task the user owns. Rejects times that
    /// are not strictly in the future.
    pub async fn schedule(
        &self,
        user_id: &str,
        task_id: &str,
        input: NewReminder,
    ) -> AppResult<Reminder> {
        let task = TaskRepository::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
        if task.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        if input.remind_at <= Utc::now() {
            return Err(AppError::Validation(
                "Reminder time must be in the future".to_string(),
            ));
        }

        ReminderRepository::create(&self.pool, task_id, input).await
    }

    pub async fn list_for_task(&self, user_id: &str, task_id: &str) -> AppResult<Vec<Reminder>> {
        let task = TaskRepository::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
        if task.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        ReminderRepository::list_by_task(&self.pool, task_id).await
    }

    pub async fn delete(&self, user_id: &str, reminder_id: &str) -> AppResult<()> {
        let reminder = ReminderRepository::find_by_id(&self.pool, reminder_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Reminder not found".to_string()))?;

        let task = TaskRepository::find_by_id(&self.pool, &reminder.task_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Associated task not found".to_string()))?;
        if task.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        ReminderRepository::delete(&self.pool, reminder_id).await?;
        Ok(())
    }

    /// One sweep tick: claim and publish every due reminder, earliest
    /// first. Safe to run from multiple instances; the claim's
    /// `is_sent = 0` guard means at most one wins each row.
    pub async fn sweep(&self) -> AppResult<SweepReport> {
        let mut report = SweepReport::default();

        loop {
            let now = Utc::now();
            let Some(reminder) = ReminderRepository::claim_next_due(&self.pool, now).await? else {
                break;
            };

            let task = TaskRepository::find_by_id(&self.pool, &reminder.task_id).await?;
            let Some(task) = task else {
                // Task deleted: the claim already marked the row sent, so
                // it just never publishes.
                tracing::debug!(
                    reminder_id = %reminder.id,
                    task_id = %reminder.task_id,
                    "Suppressing reminder for deleted task"
                );
                report.suppressed += 1;
                continue;
            };

            let event = ReminderEvent::new(&reminder, &task);
            let payload = serde_json::to_value(&event)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Reminder event: {}", e)))?;

            match self
                .dapr
                .publish_event(TOPIC_REMINDERS, REMINDER_DUE, Some(&task.id), payload)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        reminder_id = %reminder.id,
                        task_id = %task.id,
                        "Published due reminder"
                    );
                    report.published += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        reminder_id = %reminder.id,
                        "Publish failed, releasing claim for retry: {}",
                        e
                    );
                    ReminderRepository::release_claim(&self.pool, &reminder.id).await?;
                    report.failed += 1;
                    // The broker is likely down for the other rows too.
                    break;
                }
            }
        }

        Ok(report)
    }
}
