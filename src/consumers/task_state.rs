//! Derived-state handler: keeps the task cache current and mirrors every
//! lifecycle event onto the audit trail.
//!
//! Cache entries are write-through and best-effort; readers must tolerate
//! a miss. Deletes are exact. The audit publish is awaited before acking
//! so the entry is on the bus by the time the broker moves on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consumers::Outcome;
use crate::dapr::state::{keys, ttl, StateStore};
use crate::dapr::DaprClient;
use crate::error::{AppError, AppResult};
use crate::events::schemas::{AuditEvent, TaskEvent, TaskEventKind};
use crate::events::TOPIC_AUDIT_LOGS;
use crate::AppState;

/// Value kept under `task:completed:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub completed_at: DateTime<Utc>,
    pub user_id: String,
}

pub struct TaskStateConsumer {
    state_store: StateStore,
    dapr: Arc<DaprClient>,
}

impl TaskStateConsumer {
    pub fn new(state: &Arc<AppState>) -> Self {
        TaskStateConsumer {
            state_store: state.state_store.clone(),
            dapr: state.dapr.clone(),
        }
    }

    pub async fn handle(&self, event: &TaskEvent) -> Outcome {
        match self.process(event).await {
            Ok(()) => Outcome::Success,
            Err(e) => Outcome::from_error(&e),
        }
    }

    async fn process(&self, event: &TaskEvent) -> AppResult<()> {
        let cache_key = keys::task(&event.task_id);

        match event.kind {
            TaskEventKind::Created | TaskEventKind::Updated => {
                self.state_store
                    .set(&cache_key, &event.task_data, Some(ttl::TASK_CACHE))
                    .await?;
            }
            TaskEventKind::Completed => {
                self.state_store
                    .set(&cache_key, &event.task_data, Some(ttl::TASK_CACHE))
                    .await?;
                let marker = CompletionMarker {
                    completed_at: event.timestamp,
                    user_id: event.user_id.clone(),
                };
                self.state_store
                    .set(
                        &keys::task_completed(&event.task_id),
                        &marker,
                        Some(ttl::TASK_COMPLETED),
                    )
                    .await?;
            }
            TaskEventKind::Deleted => {
                self.state_store.delete(&cache_key).await?;
                self.state_store
                    .delete(&keys::task_completed(&event.task_id))
                    .await?;
            }
        }

        let audit = AuditEvent::for_task(event.kind, &event.task_id, &event.user_id);
        let payload = serde_json::to_value(&audit)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Audit event: {}", e)))?;
        self.dapr
            .publish_event(
                TOPIC_AUDIT_LOGS,
                &audit.event_type,
                Some(&audit.resource_id),
                payload,
            )
            .await?;

        Ok(())
    }
}
