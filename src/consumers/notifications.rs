//! Notification dispatcher: listens on `reminders` and fans out to the
//! delivery channel named by the event.
//!
//! Per-reminder delivery state under `notification:<reminder_id>` makes
//! redeliveries idempotent: once a reminder is recorded as sent, later
//! deliveries of the same event ack immediately.

use std::sync::Arc;

use chrono::Utc;

use crate::consumers::Outcome;
use crate::dapr::state::{
    keys, ttl, DeliveryStatus, InAppNotification, NotificationDeliveryState, StateStore,
};
use crate::db::models::NotificationType;
use crate::error::{AppError, AppResult};
use crate::events::schemas::ReminderEvent;
use crate::services::channels::{EmailChannel, Notifier, PushChannel};
use crate::AppState;

pub struct NotificationDispatcher {
    state_store: StateStore,
    email: Arc<EmailChannel>,
    push: Arc<PushChannel>,
}

impl NotificationDispatcher {
    pub fn new(state: &Arc<AppState>) -> Self {
        NotificationDispatcher {
            state_store: state.state_store.clone(),
            email: state.email.clone(),
            push: state.push.clone(),
        }
    }

    pub async fn handle(&self, event: &ReminderEvent) -> Outcome {
        let delivery_key = keys::notification(&event.reminder_id);

        let previous = match self
            .state_store
            .get::<NotificationDeliveryState>(&delivery_key)
            .await
        {
            Ok(previous) => previous,
            Err(e) => return Outcome::from_error(&e),
        };

        if let Some(ref previous) = previous {
            if previous.status == DeliveryStatus::Sent {
                tracing::debug!(
                    reminder_id = %event.reminder_id,
                    "Reminder already delivered, acking duplicate"
                );
                return Outcome::Success;
            }
        }
        let attempts = previous.map(|p| p.attempts).unwrap_or(0);

        let result = match event.notification_type {
            NotificationType::Email => self.email.deliver(event).await,
            NotificationType::Push => self.push.deliver(event).await,
            NotificationType::InApp => self.deliver_in_app(event).await,
        };

        match result {
            Ok(()) => {
                let record = NotificationDeliveryState {
                    status: DeliveryStatus::Sent,
                    attempts: attempts + 1,
                    last_attempt: Utc::now(),
                    error_message: None,
                };
                if let Err(e) = self
                    .state_store
                    .set(&delivery_key, &record, Some(ttl::NOTIFICATION_DELIVERY))
                    .await
                {
                    // Without the sent marker a redelivery would send
                    // again; surface as retryable and let the next
                    // attempt reconcile.
                    return Outcome::from_error(&e);
                }
                tracing::info!(
                    reminder_id = %event.reminder_id,
                    channel = event.notification_type.as_str(),
                    "Delivered reminder notification"
                );
                Outcome::Success
            }
            Err(e) => {
                let record = NotificationDeliveryState {
                    status: DeliveryStatus::Failed,
                    attempts: attempts + 1,
                    last_attempt: Utc::now(),
                    error_message: Some(e.to_string()),
                };
                if let Err(save_err) = self
                    .state_store
                    .set(&delivery_key, &record, Some(ttl::NOTIFICATION_DELIVERY))
                    .await
                {
                    tracing::warn!(
                        reminder_id = %event.reminder_id,
                        "Failed to record delivery failure: {}",
                        save_err
                    );
                }

                match e {
                    // Unknown provider / missing credential / permanent
                    // provider rejection: redelivery cannot help.
                    AppError::Config(_) | AppError::Provider(_) => Outcome::Drop(e.to_string()),
                    other => Outcome::from_error(&other),
                }
            }
        }
    }

    /// In-app delivery writes the inbox entry into the state store; the
    /// reminder id keys the entry, so rewrites are idempotent.
    async fn deliver_in_app(&self, event: &ReminderEvent) -> AppResult<()> {
        let note = InAppNotification {
            id: event.reminder_id.clone(),
            user_id: event.user_id.clone(),
            kind: "reminder".to_string(),
            title: "Task reminder".to_string(),
            message: format!("Reminder: {}", event.task_title),
            task_id: event.task_id.clone(),
            created_at: Utc::now(),
            is_read: false,
        };

        self.state_store
            .set(
                &keys::in_app_notification(&event.user_id, &event.reminder_id),
                &note,
                Some(ttl::IN_APP_NOTIFICATION),
            )
            .await
    }
}
