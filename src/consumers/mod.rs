//! Broker-driven consumers and the ack/nack contract they share.

pub mod audit_log;
pub mod notifications;
pub mod recurring;
pub mod task_state;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::AppError;

/// Routes the broker delivers messages to.
pub const ROUTE_TASK_EVENTS: &str = "/events/task-events";
pub const ROUTE_REMINDERS: &str = "/events/reminders";
pub const ROUTE_AUDIT_LOGS: &str = "/events/audit-logs";

/// One subscription entry returned from the discovery endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub pubsubname: String,
    pub topic: String,
    pub route: String,
}

/// The full subscription list for this app, served on `/dapr/subscribe`.
pub fn subscriptions(pubsub: &str) -> Vec<Subscription> {
    vec![
        Subscription {
            pubsubname: pubsub.to_string(),
            topic: crate::events::TOPIC_TASK_EVENTS.to_string(),
            route: ROUTE_TASK_EVENTS.to_string(),
        },
        Subscription {
            pubsubname: pubsub.to_string(),
            topic: crate::events::TOPIC_REMINDERS.to_string(),
            route: ROUTE_REMINDERS.to_string(),
        },
        Subscription {
            pubsubname: pubsub.to_string(),
            topic: crate::events::TOPIC_AUDIT_LOGS.to_string(),
            route: ROUTE_AUDIT_LOGS.to_string(),
        },
    ]
}

/// Result of handling one delivered message.
///
/// `Success` and `Drop` both ack (200) so the broker moves on; `Drop`
/// additionally logs why the message was discarded. `Retry` nacks (500)
/// and the broker redelivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Drop(String),
    Retry(String),
}

impl Outcome {
    /// Map a handler error onto the ack contract: transient errors are
    /// worth a redelivery, everything else is dropped with a log line.
    pub fn from_error(error: &AppError) -> Outcome {
        if error.is_transient() {
            Outcome::Retry(error.to_string())
        } else {
            Outcome::Drop(error.to_string())
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Drop(_) => "DROP",
            Outcome::Retry(_) => "RETRY",
        }
    }

    /// Combine the outcomes of several handlers fed from one message:
    /// any `Retry` wins (redeliver; handlers are idempotent), then any
    /// `Drop`, then `Success`.
    pub fn merge(self, other: Outcome) -> Outcome {
        match (&self, &other) {
            (Outcome::Retry(_), _) => self,
            (_, Outcome::Retry(_)) => other,
            (Outcome::Drop(_), _) => self,
            (_, Outcome::Drop(_)) => other,
            _ => Outcome::Success,
        }
    }
}

#[derive(Serialize)]
struct AckBody {
    status: &'static str,
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        let code = match &self {
            Outcome::Success => StatusCode::OK,
            Outcome::Drop(reason) => {
                tracing::warn!("Dropping event: {}", reason);
                StatusCode::OK
            }
            Outcome::Retry(reason) => {
                tracing::warn!("Nacking event for redelivery: {}", reason);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (code, Json(AckBody { status: self.status() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_list_covers_all_topics() {
        let subs = subscriptions("kafka-pubsub");
        assert_eq!(subs.len(), 3);
        assert!(subs.iter().all(|s| s.pubsubname == "kafka-pubsub"));
        assert!(subs
            .iter()
            .any(|s| s.topic == "task-events" && s.route == "/events/task-events"));
        assert!(subs
            .iter()
            .any(|s| s.topic == "reminders" && s.route == "/events/reminders"));
        assert!(subs
            .iter()
            .any(|s| s.topic == "audit-logs" && s.route == "/events/audit-logs"));
    }

    #[test]
    fn transient_errors_map_to_retry() {
        let outcome = Outcome::from_error(&AppError::ServiceUnavailable("broker".to_string()));
        assert!(matches!(outcome, Outcome::Retry(_)));

        let outcome = Outcome::from_error(&AppError::Validation("bad cron".to_string()));
        assert!(matches!(outcome, Outcome::Drop(_)));
    }

    #[test]
    fn merge_prefers_retry_over_drop_over_success() {
        let retry = Outcome::Retry("r".to_string());
        let drop = Outcome::Drop("d".to_string());

        assert!(matches!(
            Outcome::Success.merge(retry.clone()),
            Outcome::Retry(_)
        ));
        assert!(matches!(drop.clone().merge(retry), Outcome::Retry(_)));
        assert!(matches!(Outcome::Success.merge(drop), Outcome::Drop(_)));
        assert_eq!(Outcome::Success.merge(Outcome::Success), Outcome::Success);
    }
}
