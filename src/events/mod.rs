pub mod envelope;
pub mod publisher;
pub mod schemas;

/// Task lifecycle events, partitioned by `task_id`.
pub const TOPIC_TASK_EVENTS: &str = "task-events";
/// Due-reminder events, partitioned by `task_id`.
pub const TOPIC_REMINDERS: &str = "reminders";
/// Audit trail events, partitioned by `resource_id`.
pub const TOPIC_AUDIT_LOGS: &str = "audit-logs";
