//! Client for the Dapr sidecar HTTP API.
//!
//! The sidecar fronts the pub/sub broker, the state store, and the secret
//! store; this client is the only place that speaks its wire protocol.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::events::envelope::CloudEvent;

/// Backoff before each retry: one initial attempt plus a retry per
/// entry, so a dead broker blocks the publish path for at most
/// 100 + 400 + 1600 ms ≈ 2.1 s.
const PUBLISH_BACKOFF_MS: [u64; 3] = [100, 400, 1600];
const PUBLISH_MAX_ATTEMPTS: usize = PUBLISH_BACKOFF_MS.len() + 1;

/// I/O budget for every sidecar call.
const SIDECAR_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DaprClient {
    http: reqwest::Client,
    base_url: String,
    pubsub: String,
    state_store: String,
    secret_store: String,
    /// CloudEvent `source` for everything this service publishes.
    source: String,
}

impl DaprClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(SIDECAR_TIMEOUT)
            .build()
            .map_err(AppError::Request)?;

        Ok(DaprClient {
            http,
            base_url: config.dapr.base_url(),
            pubsub: config.dapr.pubsub_component.clone(),
            state_store: config.dapr.state_store.clone(),
            secret_store: config.dapr.secret_store.clone(),
            source: format!("/{}", config.server.app_id),
        })
    }

    pub fn pubsub_component(&self) -> &str {
        &self.pubsub
    }

    /// Probe the sidecar. Used by the startup dependency check and the
    /// readiness endpoint.
    pub async fn health_check(&self) -> AppResult<()> {
        let url = format!("{}/v1.0/healthz", self.base_url);
        let response = self.http.get(&url).send().await.map_err(AppError::Request)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::Sidecar(format!(
                "Sidecar health check returned {}",
                response.status()
            )))
        }
    }

    // ================== PUB/SUB ==================

    /// Wrap `data` in a CloudEvent and publish it to `topic`, waiting for
    /// broker acceptance. Retries transient failures with exponential
    /// backoff; the final error is returned to the caller, which decides
    /// whether publishing is best-effort.
    pub async fn publish_event(
        &self,
        topic: &str,
        event_type: &str,
        partition_key: Option<&str>,
        data: Value,
    ) -> AppResult<()> {
        let event = CloudEvent::wrap(&self.source, event_type, data);
        let url = format!("{}/v1.0/publish/{}/{}", self.base_url, self.pubsub, topic);

        let mut query: Vec<(&str, String)> = vec![("metadata.rawPayload", "true".to_string())];
        if let Some(key) = partition_key {
            query.push(("metadata.partitionKey", key.to_string()));
        }

        let mut last_error: Option<AppError> = None;
        for attempt in 0..PUBLISH_MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(PUBLISH_BACKOFF_MS[attempt - 1])).await;
            }

            let result = self
                .http
                .post(&url)
                .query(&query)
                .json(&event)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(topic, event_type, "Published event");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(
                        topic,
                        attempt,
                        "Publish rejected by broker: {} {}",
                        status,
                        body
                    );
                    last_error = Some(AppError::Sidecar(format!(
                        "Publish to {} failed with {}",
                        topic, status
                    )));
                }
                Err(e) => {
                    tracing::warn!(topic, attempt, "Publish request error: {}", e);
                    last_error = Some(AppError::Request(e));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::Sidecar(format!("Publish to {} failed", topic))))
    }

    // ================== STATE STORE ==================

    /// Get a raw JSON value. `None` when the key does not exist.
    pub async fn get_state(&self, key: &str) -> AppResult<Option<Value>> {
        let url = format!("{}/v1.0/state/{}/{}", self.base_url, self.state_store, key);
        let response = self.http.get(&url).send().await.map_err(AppError::Request)?;

        match response.status().as_u16() {
            200 => {
                let text = response.text().await.map_err(AppError::Request)?;
                if text.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_str(&text)
                    .map_err(|e| AppError::Sidecar(format!("Invalid state payload: {}", e)))?;
                Ok(Some(value))
            }
            204 | 404 => Ok(None),
            status => Err(AppError::Sidecar(format!(
                "Get state {} failed with {}",
                key, status
            ))),
        }
    }

    /// Save a JSON value, optionally with a TTL (seconds) and an etag for
    /// optimistic concurrency.
    pub async fn save_state(
        &self,
        key: &str,
        value: &Value,
        ttl_seconds: Option<u64>,
        etag: Option<&str>,
    ) -> AppResult<()> {
        let url = format!("{}/v1.0/state/{}", self.base_url, self.state_store);

        let mut item = json!({ "key": key, "value": value });
        if let Some(ttl) = ttl_seconds {
            item["metadata"] = json!({ "ttlInSeconds": ttl.to_string() });
        }
        if let Some(etag) = etag {
            item["etag"] = json!(etag);
        }

        let response = self
            .http
            .post(&url)
            .json(&json!([item]))
            .send()
            .await
            .map_err(AppError::Request)?;

        if response.status().is_success() {
            tracing::debug!(key, "Saved state");
            Ok(())
        } else {
            Err(AppError::Sidecar(format!(
                "Save state {} failed with {}",
                key,
                response.status()
            )))
        }
    }

    /// Delete a state entry. Idempotent; deleting a missing key succeeds.
    pub async fn delete_state(&self, key: &str) -> AppResult<()> {
        let url = format!("{}/v1.0/state/{}/{}", self.base_url, self.state_store, key);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(AppError::Request)?;

        match response.status().as_u16() {
            200 | 204 | 404 => Ok(()),
            status => Err(AppError::Sidecar(format!(
                "Delete state {} failed with {}",
                key, status
            ))),
        }
    }

    // ================== SECRET STORE ==================

    /// Fetch a named secret (e.g. a notification provider credential).
    /// `None` when the secret is not configured.
    pub async fn get_secret(&self, name: &str) -> AppResult<Option<HashMap<String, String>>> {
        let url = format!(
            "{}/v1.0/secrets/{}/{}",
            self.base_url, self.secret_store, name
        );
        let response = self.http.get(&url).send().await.map_err(AppError::Request)?;

        match response.status().as_u16() {
            200 => {
                let secret = response
                    .json::<HashMap<String, String>>()
                    .await
                    .map_err(AppError::Request)?;
                Ok(Some(secret))
            }
            204 | 404 => Ok(None),
            status => Err(AppError::Sidecar(format!(
                "Get secret {} failed with {}",
                name, status
            ))),
        }
    }
}
