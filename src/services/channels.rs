//! Delivery channels for the notification dispatcher.
//!
//! Email and push go out through external providers whose credentials
//! live in the secret store; in-app delivery is a state-store write and
//! lives in the dispatcher itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::dapr::DaprClient;
use crate::error::{AppError, AppResult};
use crate::events::schemas::ReminderEvent;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Secret names under the configured secret store.
pub const EMAIL_PROVIDER_SECRET: &str = "email-provider";
pub const PUSH_PROVIDER_SECRET: &str = "push-provider";

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a reminder notification. Errors distinguish permanent
    /// failures (`Config`, `Provider`) from transient ones so the
    /// dispatcher can decide between dropping and redelivery.
    async fn deliver(&self, event: &ReminderEvent) -> AppResult<()>;
}

/// Shared plumbing for HTTP providers: fetch the credential, POST the
/// payload, classify the response.
struct ProviderCall<'a> {
    dapr: &'a DaprClient,
    http: &'a reqwest::Client,
    secret_name: &'static str,
    channel: &'static str,
}

impl<'a> ProviderCall<'a> {
    async fn send(&self, payload: serde_json::Value) -> AppResult<()> {
        let secret = self
            .dapr
            .get_secret(self.secret_name)
            .await?
            .ok_or_else(|| {
                AppError::Config(format!("{} credential not configured", self.channel))
            })?;

        let url = secret.get("api_url").cloned().ok_or_else(|| {
            AppError::Config(format!("{} credential missing api_url", self.channel))
        })?;
        let api_key = secret.get("api_key").cloned().ok_or_else(|| {
            AppError::Config(format!("{} credential missing api_key", self.channel))
        })?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(AppError::Request)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(AppError::ServiceUnavailable(format!(
                "{} provider returned {}: {}",
                self.channel, status, body
            )))
        } else {
            // 4xx from the provider is a permanent rejection.
            Err(AppError::Provider(format!(
                "{} provider rejected notification ({}): {}",
                self.channel, status, body
            )))
        }
    }
}

pub struct EmailChannel {
    dapr: Arc<DaprClient>,
    http: reqwest::Client,
}

impl EmailChannel {
    pub fn new(dapr: Arc<DaprClient>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(AppError::Request)?;
        Ok(EmailChannel { dapr, http })
    }
}

#[async_trait]
impl Notifier for EmailChannel {
    async fn deliver(&self, event: &ReminderEvent) -> AppResult<()> {
        let call = ProviderCall {
            dapr: &self.dapr,
            http: &self.http,
            secret_name: EMAIL_PROVIDER_SECRET,
            channel: "email",
        };
        call.send(json!({
            "user_id": event.user_id,
            "subject": format!("Reminder: {}", event.task_title),
            "body": format!(
                "Your task \"{}\" was due at {}.",
                event.task_title,
                event.remind_at.to_rfc3339()
            ),
            "task_id": event.task_id,
            "reminder_id": event.reminder_id,
        }))
        .await
    }
}

pub struct PushChannel {
    dapr: Arc<DaprClient>,
    http: reqwest::Client,
}

impl PushChannel {
    pub fn new(dapr: Arc<DaprClient>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(AppError::Request)?;
        Ok(PushChannel { dapr, http })
    }
}

#[async_trait]
impl Notifier for PushChannel {
    async fn deliver(&self, event: &ReminderEvent) -> AppResult<()> {
        let call = ProviderCall {
            dapr: &self.dapr,
            http: &self.http,
            secret_name: PUSH_PROVIDER_SECRET,
            channel: "push",
        };
        call.send(json!({
            "user_id": event.user_id,
            "title": "Task reminder",
            "message": format!("Reminder: {}", event.task_title),
            "task_id": event.task_id,
            "reminder_id": event.reminder_id,
        }))
        .await
    }
}
