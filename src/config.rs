use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub dapr: DaprConfig,
    pub events: EventsConfig,
    pub consumers: ConsumerConfig,
    pub reminders: ReminderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Dapr application id for this service. Also used as the CloudEvent
    /// `source` (`/<app_id>`).
    pub app_id: String,
    /// How long to keep draining in-flight handlers on shutdown before
    /// aborting them.
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaprConfig {
    /// Port where the Dapr sidecar HTTP API listens.
    pub http_port: u16,
    /// Pub/sub component name (e.g. a Kafka cluster binding).
    pub pubsub_component: String,
    /// State store component name.
    pub state_store: String,
    /// Secret store component name (notification provider credentials).
    pub secret_store: String,
}

impl DaprConfig {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Master switch for lifecycle event publishing (disabled in tests).
    pub publishing_enabled: bool,
    /// Capacity of the bounded publish queue; enqueue beyond this drops
    /// the event with a warning.
    pub queue_capacity: usize,
    /// Number of publish workers. Events are routed to workers by
    /// partition key, so per-entity ordering survives the pool.
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Maximum concurrently-processed messages per topic.
    pub topic_concurrency: usize,
    /// Per-message processing budget; exceeding it nacks the message.
    pub handler_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    /// How often the internal sweep looks for due reminders.
    pub sweep_interval_seconds: u64,
    /// Whether the internal sweep worker runs (the cron-binding callback
    /// stays available either way).
    pub sweep_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                app_id: env::var("APP_ID").unwrap_or_else(|_| "task-lifecycle".to_string()),
                shutdown_grace_seconds: env::var("SHUTDOWN_GRACE_SECONDS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .unwrap_or(15),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| ConfigError::MissingEnv("DATABASE_URL".to_string()))?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            dapr: DaprConfig {
                http_port: env::var("DAPR_HTTP_PORT")
                    .unwrap_or_else(|_| "3500".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("DAPR_HTTP_PORT".to_string()))?,
                pubsub_component: env::var("PUBSUB_COMPONENT_NAME")
                    .unwrap_or_else(|_| "kafka-pubsub".to_string()),
                state_store: env::var("STATE_STORE_NAME")
                    .unwrap_or_else(|_| "postgres-statestore".to_string()),
                secret_store: env::var("SECRET_STORE_NAME")
                    .unwrap_or_else(|_| "kubernetes-secrets".to_string()),
            },
            events: EventsConfig {
                publishing_enabled: bool_env("EVENT_PUBLISHING_ENABLED", true),
                queue_capacity: env::var("PUBLISH_QUEUE_CAPACITY")
                    .unwrap_or_else(|_| "1024".to_string())
                    .parse()
                    .unwrap_or(1024),
                workers: env::var("PUBLISH_WORKERS")
                    .unwrap_or_else(|_| "4".to_string())
                    .parse()
                    .unwrap_or(4)
                    .max(1),
            },
            consumers: ConsumerConfig {
                topic_concurrency: env::var("CONSUMER_TOPIC_CONCURRENCY")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()
                    .unwrap_or(8)
                    .max(1),
                handler_timeout_seconds: env::var("CONSUMER_HANDLER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            reminders: ReminderConfig {
                sweep_interval_seconds: env::var("REMINDER_SWEEP_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60)
                    .max(1),
                sweep_enabled: bool_env("REMINDER_SWEEP_ENABLED", true),
            },
        })
    }
}

fn bool_env(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                app_id: "task-lifecycle".to_string(),
                shutdown_grace_seconds: 15,
            },
            database: DatabaseConfig {
                url: "sqlite://data/tasks.db".to_string(),
                max_connections: 5,
            },
            dapr: DaprConfig {
                http_port: 3500,
                pubsub_component: "kafka-pubsub".to_string(),
                state_store: "postgres-statestore".to_string(),
                secret_store: "kubernetes-secrets".to_string(),
            },
            events: EventsConfig {
                publishing_enabled: true,
                queue_capacity: 1024,
                workers: 4,
            },
            consumers: ConsumerConfig {
                topic_concurrency: 8,
                handler_timeout_seconds: 30,
            },
            reminders: ReminderConfig {
                sweep_interval_seconds: 60,
                sweep_enabled: true,
            },
        }
    }
}
