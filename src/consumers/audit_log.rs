//! Audit-log consumer: emits a structured log line per audit event.
//! Durable storage of the trail is handled downstream of log aggregation.

use serde_json::Value;

use crate::consumers::Outcome;

pub struct AuditLogConsumer;

impl AuditLogConsumer {
    pub fn handle(payload: &Value) -> Outcome {
        let event_type = payload
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let resource_id = payload
            .get("resource_id")
            .or_else(|| payload.get("task_id"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let user_id = payload
            .get("user_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let timestamp = payload
            .get("timestamp")
            .and_then(Value::as_str)
            .unwrap_or("");

        tracing::info!(
            target: "audit",
            event_type,
            resource_id,
            user_id,
            timestamp,
            "audit entry"
        );

        Outcome::Success
    }
}
