//! Test support: an in-process fake of the sidecar HTTP API (pub/sub,
//! state, secrets, plus stand-in notification provider endpoints) and
//! helpers for building an `AppState` wired to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::dapr::{DaprClient, StateStore};
use crate::events::publisher::EventPublisher;
use crate::services::channels::{EmailChannel, PushChannel};
use crate::{AppState, ConsumerLimits};

/// One message accepted by the fake broker.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub body: Value,
}

impl PublishedMessage {
    /// CloudEvent `type` of the recorded envelope.
    pub fn event_type(&self) -> &str {
        self.body.get("type").and_then(Value::as_str).unwrap_or("")
    }

    pub fn data(&self) -> &Value {
        self.body.get("data").unwrap_or(&Value::Null)
    }
}

#[derive(Default)]
pub struct FakeSidecar {
    pub state: Mutex<HashMap<String, Value>>,
    pub published: Mutex<Vec<PublishedMessage>>,
    pub secrets: Mutex<HashMap<String, HashMap<String, String>>>,
    /// When non-zero, that many publish calls fail with 500.
    pub fail_publishes: AtomicU32,
    /// Requests received by the stand-in provider endpoints.
    pub provider_calls: Mutex<Vec<Value>>,
    /// Per-key write counters acting as etags; a save carrying a stale
    /// etag is rejected with 409 like the real state store.
    etags: Mutex<HashMap<String, u64>>,
    /// Last `ttlInSeconds` metadata observed per key.
    ttls: Mutex<HashMap<String, u64>>,
    port: std::sync::OnceLock<u16>,
}

impl FakeSidecar {
    /// URL of a stand-in provider endpoint (`accept`, `reject`, `flaky`).
    pub fn provider_url(&self, behavior: &str) -> String {
        format!(
            "http://127.0.0.1:{}/provider/{}",
            self.port.get().expect("sidecar bound"),
            behavior
        )
    }

    pub async fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn state_value(&self, key: &str) -> Option<Value> {
        self.state.lock().await.get(key).cloned()
    }

    pub async fn set_secret(&self, name: &str, values: &[(&str, &str)]) {
        let map = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.secrets.lock().await.insert(name.to_string(), map);
    }

    /// Current etag for a key, as the store would hand it back.
    pub async fn etag_of(&self, key: &str) -> Option<String> {
        self.etags.lock().await.get(key).map(|v| v.to_string())
    }

    /// TTL (seconds) the last write for a key carried, if any.
    pub async fn ttl_of(&self, key: &str) -> Option<u64> {
        self.ttls.lock().await.get(key).copied()
    }
}

async fn publish(
    State(sidecar): State<Arc<FakeSidecar>>,
    Path((_pubsub, topic)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    if sidecar.fail_publishes.load(Ordering::SeqCst) > 0 {
        sidecar.fail_publishes.fetch_sub(1, Ordering::SeqCst);
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    sidecar
        .published
        .lock()
        .await
        .push(PublishedMessage { topic, body });
    StatusCode::NO_CONTENT
}

async fn save_state(
    State(sidecar): State<Arc<FakeSidecar>>,
    Json(items): Json<Value>,
) -> StatusCode {
    let Some(items) = items.as_array() else {
        return StatusCode::BAD_REQUEST;
    };

    let mut state = sidecar.state.lock().await;
    let mut etags = sidecar.etags.lock().await;
    let mut ttls = sidecar.ttls.lock().await;

    for item in items {
        let (Some(key), Some(value)) = (
            item.get("key").and_then(Value::as_str),
            item.get("value"),
        ) else {
            continue;
        };

        if let Some(requested) = item.get("etag").and_then(Value::as_str) {
            let current = etags.get(key).copied().unwrap_or(0);
            if requested != current.to_string() {
                return StatusCode::CONFLICT;
            }
        }

        state.insert(key.to_string(), value.clone());
        *etags.entry(key.to_string()).or_insert(0) += 1;

        if let Some(ttl) = item
            .get("metadata")
            .and_then(|m| m.get("ttlInSeconds"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<u64>().ok())
        {
            ttls.insert(key.to_string(), ttl);
        }
    }

    StatusCode::NO_CONTENT
}

async fn get_state(
    State(sidecar): State<Arc<FakeSidecar>>,
    Path((_store, key)): Path<(String, String)>,
) -> axum::response::Response {
    use axum::response::IntoResponse;
    match sidecar.state.lock().await.get(&key) {
        Some(value) => (StatusCode::OK, Json(value.clone())).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn delete_state(
    State(sidecar): State<Arc<FakeSidecar>>,
    Path((_store, key)): Path<(String, String)>,
) -> StatusCode {
    sidecar.state.lock().await.remove(&key);
    sidecar.etags.lock().await.remove(&key);
    sidecar.ttls.lock().await.remove(&key);
    StatusCode::NO_CONTENT
}

async fn get_secret(
    State(sidecar): State<Arc<FakeSidecar>>,
    Path((_store, name)): Path<(String, String)>,
) -> axum::response::Response {
    use axum::response::IntoResponse;
    match sidecar.secrets.lock().await.get(&name) {
        Some(secret) => (StatusCode::OK, Json(secret.clone())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn provider_accept(
    State(sidecar): State<Arc<FakeSidecar>>,
    Json(body): Json<Value>,
) -> StatusCode {
    sidecar.provider_calls.lock().await.push(body);
    StatusCode::OK
}

async fn provider_reject() -> StatusCode {
    StatusCode::BAD_REQUEST
}

async fn provider_flaky() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

/// Bind the fake sidecar on an ephemeral port.
pub async fn spawn_sidecar() -> (Arc<FakeSidecar>, u16) {
    let sidecar = Arc::new(FakeSidecar::default());

    let app = Router::new()
        .route("/v1.0/healthz", get(|| async { StatusCode::NO_CONTENT }))
        .route("/v1.0/publish/:pubsub/:topic", post(publish))
        .route("/v1.0/state/:store", post(save_state))
        .route("/v1.0/state/:store/:key", get(get_state).delete(delete_state))
        .route("/v1.0/secrets/:store/:name", get(get_secret))
        .route("/provider/accept", post(provider_accept))
        .route("/provider/reject", post(provider_reject))
        .route("/provider/flaky", post(provider_flaky))
        .with_state(sidecar.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    sidecar.port.set(port).unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (sidecar, port)
}

/// A fresh in-memory database with migrations applied.
pub async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// Full application state backed by the fake sidecar and an in-memory
/// database.
pub async fn test_app_state() -> (Arc<AppState>, Arc<FakeSidecar>) {
    let (sidecar, port) = spawn_sidecar().await;

    let mut config = Config::default();
    config.dapr.http_port = port;

    let pool = test_pool().await;
    let dapr = Arc::new(DaprClient::new(&config).unwrap());
    let state_store = StateStore::new(dapr.clone());
    let publisher = Arc::new(EventPublisher::new(dapr.clone(), &config.events));
    let email = Arc::new(EmailChannel::new(dapr.clone()).unwrap());
    let push = Arc::new(PushChannel::new(dapr.clone()).unwrap());
    let limits = ConsumerLimits::new(config.consumers.topic_concurrency);

    let state = Arc::new(AppState {
        db: pool,
        config,
        dapr,
        state_store,
        publisher,
        email,
        push,
        limits,
    });

    (state, sidecar)
}

/// Poll until `check` returns `Some` or the timeout expires. Used to
/// observe the asynchronous publisher queue.
pub async fn wait_for<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = check().await {
            return value;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within 5s");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
