//! CloudEvents v1.0 framing for everything that crosses the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const SPEC_VERSION: &str = "1.0";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// The JSON envelope carried on every topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEvent {
    pub specversion: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub id: String,
    pub time: DateTime<Utc>,
    pub datacontenttype: String,
    pub data: Value,
}

impl CloudEvent {
    /// Wrap a payload for publishing. `source` is the producing service
    /// (`/<app_id>`), `event_type` the payload's declared type.
    pub fn wrap(source: &str, event_type: &str, data: Value) -> Self {
        CloudEvent {
            specversion: SPEC_VERSION.to_string(),
            event_type: event_type.to_string(),
            source: source.to_string(),
            id: Uuid::new_v4().to_string(),
            time: Utc::now(),
            datacontenttype: CONTENT_TYPE_JSON.to_string(),
            data,
        }
    }
}

/// The payload extracted from an incoming message, with enough envelope
/// context for logging and dedup.
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    /// Envelope id, when the message was wrapped.
    pub envelope_id: Option<String>,
    /// Envelope type, when the message was wrapped.
    pub envelope_type: Option<String>,
    pub payload: Value,
}

/// Parse an incoming body as either a CloudEvent envelope or a bare
/// payload, distinguished by the presence of a `data` field.
///
/// Producers in this system always wrap; bare payloads are accepted for
/// legacy paths and logged so the ambiguity can be retired later.
pub fn parse_incoming(body: &[u8]) -> AppResult<IncomingEvent> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event body: {}", e)))?;

    let Value::Object(mut map) = value else {
        return Err(AppError::BadRequest(
            "Event body must be a JSON object".to_string(),
        ));
    };

    match map.remove("data") {
        Some(payload) => Ok(IncomingEvent {
            envelope_id: map
                .get("id")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            envelope_type: map
                .get("type")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            payload,
        }),
        None => {
            tracing::warn!("Received bare (non-CloudEvent) payload; accepting for compatibility");
            Ok(IncomingEvent {
                envelope_id: None,
                envelope_type: None,
                payload: Value::Object(map),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrap_sets_envelope_fields() {
        let event = CloudEvent::wrap("/task-lifecycle", "task.created", json!({"task_id": "t1"}));
        assert_eq!(event.specversion, "1.0");
        assert_eq!(event.event_type, "task.created");
        assert_eq!(event.source, "/task-lifecycle");
        assert_eq!(event.datacontenttype, "application/json");
        assert!(!event.id.is_empty());
        assert_eq!(event.data["task_id"], "t1");
    }

    #[test]
    fn envelope_time_serializes_with_trailing_z() {
        let event = CloudEvent::wrap("/svc", "task.created", json!({}));
        let text = serde_json::to_string(&event).unwrap();
        let time_field = serde_json::from_str::<Value>(&text).unwrap()["time"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(time_field.ends_with('Z'), "got {}", time_field);
    }

    #[test]
    fn wrapped_body_yields_inner_payload() {
        let body = serde_json::to_vec(&json!({
            "specversion": "1.0",
            "type": "task.completed",
            "source": "/api",
            "id": "evt-1",
            "time": "2026-02-02T09:00:00Z",
            "datacontenttype": "application/json",
            "data": {"task_id": "t1"}
        }))
        .unwrap();

        let incoming = parse_incoming(&body).unwrap();
        assert_eq!(incoming.envelope_id.as_deref(), Some("evt-1"));
        assert_eq!(incoming.envelope_type.as_deref(), Some("task.completed"));
        assert_eq!(incoming.payload["task_id"], "t1");
    }

    #[test]
    fn bare_body_is_accepted_as_payload() {
        let body = serde_json::to_vec(&json!({"task_id": "t1", "event_type": "task.completed"}))
            .unwrap();
        let incoming = parse_incoming(&body).unwrap();
        assert!(incoming.envelope_id.is_none());
        assert_eq!(incoming.payload["event_type"], "task.completed");
    }

    #[test]
    fn unknown_envelope_fields_are_ignored() {
        let body = serde_json::to_vec(&json!({
            "specversion": "1.0",
            "type": "task.created",
            "id": "evt-2",
            "traceparent": "00-abc-def-01",
            "data": {"x": 1}
        }))
        .unwrap();
        let incoming = parse_incoming(&body).unwrap();
        assert_eq!(incoming.payload["x"], 1);
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(parse_incoming(b"[1,2,3]").is_err());
        assert!(parse_incoming(b"not json").is_err());
    }
}
