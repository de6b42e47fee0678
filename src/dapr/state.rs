//! Typed façade over the state store, plus the record types the workers
//! keep there: cache entries, dedup markers, delivery state, and the
//! in-app notification inbox.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dapr::client::DaprClient;
use crate::error::{AppError, AppResult};

/// Key builders for the flat prefix-colon namespace.
pub mod keys {
    pub fn task(task_id: &str) -> String {
        format!("task:{}", task_id)
    }

    pub fn task_completed(task_id: &str) -> String {
        format!("task:completed:{}", task_id)
    }

    pub fn recurring(task_id: &str) -> String {
        format!("recurring:{}", task_id)
    }

    pub fn recurring_processing(task_id: &str) -> String {
        format!("recurring-processing:{}", task_id)
    }

    pub fn notification(reminder_id: &str) -> String {
        format!("notification:{}", reminder_id)
    }

    pub fn in_app_notification(user_id: &str, id: &str) -> String {
        format!("in-app-notification:{}:{}", user_id, id)
    }

    pub fn session(session_id: &str) -> String {
        format!("session:{}", session_id)
    }

    #[allow(dead_code)]
    pub fn rate_limit(scope: &str) -> String {
        format!("rate_limit:{}", scope)
    }
}

/// TTLs for derived state, in seconds.
pub mod ttl {
    /// Task cache entries.
    pub const TASK_CACHE: u64 = 3600;
    /// Completion markers.
    pub const TASK_COMPLETED: u64 = 86_400;
    /// Cached recurrence rules.
    pub const RECURRING_RULE: u64 = 3600;
    /// Recurring-processing dedup markers.
    pub const RECURRING_PROCESSING: u64 = 3600;
    /// Notification delivery state.
    pub const NOTIFICATION_DELIVERY: u64 = 86_400;
    /// In-app notification inbox entries.
    pub const IN_APP_NOTIFICATION: u64 = 7 * 86_400;
    /// Session records.
    pub const SESSION: u64 = 3600;
}

#[derive(Debug, Clone)]
pub struct StateStore {
    client: Arc<DaprClient>,
}

impl StateStore {
    pub fn new(client: Arc<DaprClient>) -> Self {
        StateStore { client }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.client.get_state(key).await? {
            None => Ok(None),
            Some(value) => {
                let parsed = serde_json::from_value(value)
                    .map_err(|e| AppError::Sidecar(format!("Invalid state for {}: {}", key, e)))?;
                Ok(Some(parsed))
            }
        }
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> AppResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("State serialization: {}", e)))?;
        self.client.save_state(key, &value, ttl_seconds, None).await
    }

    /// Save guarded by an etag; fails on concurrent modification.
    #[allow(dead_code)]
    pub async fn set_with_etag<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
        etag: &str,
    ) -> AppResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("State serialization: {}", e)))?;
        self.client
            .save_state(key, &value, ttl_seconds, Some(etag))
            .await
    }

    pub async fn delete(&self, key: &str) -> AppResult<()> {
        self.client.delete_state(key).await
    }

    /// Read-increment-write counter with a TTL window. Approximate under
    /// concurrency; callers must not rely on it being exact.
    #[allow(dead_code)]
    pub async fn increment_counter(&self, key: &str, window_seconds: u64) -> AppResult<i64> {
        let current: i64 = self.get(key).await?.unwrap_or(0);
        let next = current + 1;
        self.set(key, &next, Some(window_seconds)).await?;
        Ok(next)
    }

    // ================== SESSION RECORDS ==================

    #[allow(dead_code)]
    pub async fn set_session(
        &self,
        session_id: &str,
        user_id: &str,
        data: Value,
        ttl_seconds: u64,
    ) -> AppResult<()> {
        let now = Utc::now();
        let record = SessionRecord {
            user_id: user_id.to_string(),
            data,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds as i64),
        };
        self.set(&keys::session(session_id), &record, Some(ttl_seconds))
            .await
    }

    #[allow(dead_code)]
    pub async fn get_session(&self, session_id: &str) -> AppResult<Option<SessionRecord>> {
        self.get(&keys::session(session_id)).await
    }

    #[allow(dead_code)]
    pub async fn delete_session(&self, session_id: &str) -> AppResult<()> {
        self.delete(&keys::session(session_id)).await
    }
}

/// A user session, kept under `session:<id>` with a TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Dedup/progress marker for the recurring worker, kept under
/// `recurring-processing:<task_id>` for an hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringProcessingState {
    pub status: ProcessingStatus,
    #[serde(default)]
    pub next_task_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Failed,
}

/// Per-reminder delivery record, kept under `notification:<reminder_id>`
/// for 24 hours. Drives idempotent re-delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDeliveryState {
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_attempt: DateTime<Utc>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// In-app inbox entry, kept under `in-app-notification:<user_id>:<id>`
/// for 7 days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InAppNotification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dapr::DaprClient;
    use crate::error::AppError;
    use crate::testutil::{spawn_sidecar, FakeSidecar};
    use serde_json::json;

    async fn test_store() -> (StateStore, Arc<FakeSidecar>) {
        let (sidecar, port) = spawn_sidecar().await;
        let mut config = Config::default();
        config.dapr.http_port = port;
        let client = Arc::new(DaprClient::new(&config).unwrap());
        (StateStore::new(client), sidecar)
    }

    #[test]
    fn keys_follow_prefix_colon_convention() {
        assert_eq!(keys::task("t1"), "task:t1");
        assert_eq!(keys::task_completed("t1"), "task:completed:t1");
        assert_eq!(keys::recurring("t1"), "recurring:t1");
        assert_eq!(keys::recurring_processing("t1"), "recurring-processing:t1");
        assert_eq!(keys::notification("r1"), "notification:r1");
        assert_eq!(
            keys::in_app_notification("u1", "r1"),
            "in-app-notification:u1:r1"
        );
        assert_eq!(keys::session("s1"), "session:s1");
        assert_eq!(keys::rate_limit("user:u1"), "rate_limit:user:u1");
    }

    #[test]
    fn processing_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ProcessingStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::Sent).unwrap(),
            "\"sent\""
        );
    }

    #[tokio::test]
    async fn set_get_delete_round_trip_with_ttl() {
        let (store, sidecar) = test_store().await;

        store
            .set("task:t1", &json!({"title": "Standup"}), Some(3600))
            .await
            .unwrap();
        let cached: Option<serde_json::Value> = store.get("task:t1").await.unwrap();
        assert_eq!(cached.unwrap()["title"], "Standup");
        assert_eq!(sidecar.ttl_of("task:t1").await, Some(3600));

        store.delete("task:t1").await.unwrap();
        let cached: Option<serde_json::Value> = store.get("task:t1").await.unwrap();
        assert!(cached.is_none());

        // Deleting a missing key is a no-op, not an error.
        store.delete("task:t1").await.unwrap();
    }

    #[tokio::test]
    async fn stale_etag_write_is_rejected() {
        let (store, sidecar) = test_store().await;

        store.set("task:t1", &json!({"v": 1}), None).await.unwrap();
        let etag = sidecar.etag_of("task:t1").await.unwrap();

        store
            .set_with_etag("task:t1", &json!({"v": 2}), None, &etag)
            .await
            .unwrap();

        // The first write's etag is now stale.
        let result = store
            .set_with_etag("task:t1", &json!({"v": 3}), None, &etag)
            .await;
        assert!(matches!(result, Err(AppError::Sidecar(_))));

        let current: serde_json::Value = store.get("task:t1").await.unwrap().unwrap();
        assert_eq!(current["v"], 2, "losing write must not land");
    }

    #[tokio::test]
    async fn counter_increments_across_calls() {
        let (store, sidecar) = test_store().await;
        let key = keys::rate_limit("user:u1");

        assert_eq!(store.increment_counter(&key, 60).await.unwrap(), 1);
        assert_eq!(store.increment_counter(&key, 60).await.unwrap(), 2);
        assert_eq!(store.increment_counter(&key, 60).await.unwrap(), 3);

        // The counter lives under the scoped key with the window as TTL.
        let stored: i64 =
            serde_json::from_value(sidecar.state_value("rate_limit:user:u1").await.unwrap())
                .unwrap();
        assert_eq!(stored, 3);
        assert_eq!(sidecar.ttl_of("rate_limit:user:u1").await, Some(60));
    }

    #[tokio::test]
    async fn session_round_trips_and_carries_its_expiry() {
        let (store, sidecar) = test_store().await;

        store
            .set_session("s1", "u1", json!({"theme": "dark"}), ttl::SESSION)
            .await
            .unwrap();

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.data["theme"], "dark");
        assert_eq!(
            session.expires_at - session.created_at,
            Duration::seconds(ttl::SESSION as i64)
        );
        assert_eq!(sidecar.ttl_of("session:s1").await, Some(ttl::SESSION));

        store.delete_session("s1").await.unwrap();
        assert!(store.get_session("s1").await.unwrap().is_none());
    }
}
