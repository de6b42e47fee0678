//! The broker-facing surface: subscription discovery plus one POST route
//! per subscribed topic. Handlers run under a per-topic concurrency
//! ceiling and a per-message timeout; outcomes translate to the ack
//! contract in `consumers::Outcome`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::Semaphore;

use crate::consumers::audit_log::AuditLogConsumer;
use crate::consumers::notifications::NotificationDispatcher;
use crate::consumers::recurring::RecurringTaskConsumer;
use crate::consumers::task_state::TaskStateConsumer;
use crate::consumers::{self, Outcome, Subscription};
use crate::events::envelope::parse_incoming;
use crate::events::schemas::{ReminderEvent, TaskEvent};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dapr/subscribe", get(list_subscriptions))
        .route(consumers::ROUTE_TASK_EVENTS, post(handle_task_events))
        .route(consumers::ROUTE_REMINDERS, post(handle_reminders))
        .route(consumers::ROUTE_AUDIT_LOGS, post(handle_audit_logs))
}

/// Called by the broker runtime at startup to discover what this app
/// consumes.
async fn list_subscriptions(State(state): State<Arc<AppState>>) -> Json<Vec<Subscription>> {
    Json(consumers::subscriptions(state.dapr.pubsub_component()))
}

async fn handle_task_events(State(state): State<Arc<AppState>>, body: Bytes) -> Outcome {
    let limit = state.limits.task_events.clone();
    let inner = state.clone();
    bounded(&state, limit, async move {
        let incoming = match parse_incoming(&body) {
            Ok(incoming) => incoming,
            Err(e) => return Outcome::Drop(format!("unparseable event body: {}", e)),
        };
        let event = match TaskEvent::decode(incoming.payload) {
            Ok(event) => event,
            Err(e) => return Outcome::Drop(format!("bad task event: {}", e)),
        };

        if let Some(ref envelope_type) = incoming.envelope_type {
            if envelope_type != event.kind.as_str() {
                tracing::warn!(
                    envelope_type = %envelope_type,
                    payload_type = event.kind.as_str(),
                    "Envelope type disagrees with payload event_type"
                );
            }
        }

        tracing::debug!(
            event_type = event.kind.as_str(),
            task_id = %event.task_id,
            envelope_id = incoming.envelope_id.as_deref().unwrap_or("-"),
            "Received task event"
        );

        // Two handlers share the topic: the recurring worker and the
        // derived-state/audit handler. Both are idempotent, so a retry
        // triggered by either is safe for the other.
        let recurring = RecurringTaskConsumer::new(&inner).handle(&event).await;
        let derived = TaskStateConsumer::new(&inner).handle(&event).await;
        recurring.merge(derived)
    })
    .await
}

async fn handle_reminders(State(state): State<Arc<AppState>>, body: Bytes) -> Outcome {
    let limit = state.limits.reminders.clone();
    let inner = state.clone();
    bounded(&state, limit, async move {
        let incoming = match parse_incoming(&body) {
            Ok(incoming) => incoming,
            Err(e) => return Outcome::Drop(format!("unparseable event body: {}", e)),
        };
        let event = match ReminderEvent::decode(incoming.payload) {
            Ok(event) => event,
            Err(e) => return Outcome::Drop(format!("bad reminder event: {}", e)),
        };

        tracing::debug!(
            reminder_id = %event.reminder_id,
            task_id = %event.task_id,
            "Received reminder event"
        );

        NotificationDispatcher::new(&inner).handle(&event).await
    })
    .await
}

async fn handle_audit_logs(State(state): State<Arc<AppState>>, body: Bytes) -> Outcome {
    let limit = state.limits.audit_logs.clone();
    bounded(&state, limit, async move {
        let incoming = match parse_incoming(&body) {
            Ok(incoming) => incoming,
            Err(e) => return Outcome::Drop(format!("unparseable event body: {}", e)),
        };
        AuditLogConsumer::handle(&incoming.payload)
    })
    .await
}

/// Run a handler under the topic's concurrency permit and the per-message
/// timeout. A timeout nacks so the broker redelivers.
async fn bounded<F>(state: &Arc<AppState>, limit: Arc<Semaphore>, handler: F) -> Outcome
where
    F: Future<Output = Outcome>,
{
    let permit = match limit.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return Outcome::Retry("consumer shutting down".to_string()),
    };

    let budget = Duration::from_secs(state.config.consumers.handler_timeout_seconds);
    let outcome = match tokio::time::timeout(budget, handler).await {
        Ok(outcome) => outcome,
        Err(_) => Outcome::Retry("handler exceeded processing budget".to_string()),
    };

    drop(permit);
    outcome
}
