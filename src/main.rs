use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::sync::{broadcast, Semaphore};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod consumers;
mod dapr;
mod db;
mod error;
mod events;
mod recurrence;
mod routes;
mod services;
#[cfg(test)]
mod testutil;

use config::Config;
use dapr::{DaprClient, StateStore};
use events::publisher::EventPublisher;
use services::channels::{EmailChannel, PushChannel};

/// Per-topic concurrency ceilings for broker-delivered messages.
pub struct ConsumerLimits {
    pub task_events: Arc<Semaphore>,
    pub reminders: Arc<Semaphore>,
    pub audit_logs: Arc<Semaphore>,
}

impl ConsumerLimits {
    pub fn new(per_topic: usize) -> Self {
        ConsumerLimits {
            task_events: Arc::new(Semaphore::new(per_topic)),
            reminders: Arc::new(Semaphore::new(per_topic)),
            audit_logs: Arc::new(Semaphore::new(per_topic)),
        }
    }
}

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub dapr: Arc<DaprClient>,
    pub state_store: StateStore,
    pub publisher: Arc<EventPublisher>,
    pub email: Arc<EmailChannel>,
    pub push: Arc<PushChannel>,
    pub limits: ConsumerLimits,
}

/// Configuration problem at startup (missing/invalid environment).
const EXIT_CONFIG: i32 = 1;
/// A required dependency (database, sidecar) was unreachable at startup.
const EXIT_DEPENDENCY: i32 = 2;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_lifecycle=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    tracing::info!("Starting task lifecycle service ({})", config.server.app_id);

    // Initialize database
    let pool = match services::init::init_db(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database unavailable during startup: {:?}", e);
            std::process::exit(EXIT_DEPENDENCY);
        }
    };

    // Initialize the sidecar client and probe it; without the broker and
    // state store this service cannot do useful work.
    let dapr = match DaprClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to construct sidecar client: {:?}", e);
            std::process::exit(EXIT_DEPENDENCY);
        }
    };
    if let Err(e) = dapr.health_check().await {
        tracing::error!("Sidecar unreachable during startup probe: {:?}", e);
        std::process::exit(EXIT_DEPENDENCY);
    }

    let state_store = StateStore::new(dapr.clone());
    let publisher = Arc::new(EventPublisher::new(dapr.clone(), &config.events));
    let channels = EmailChannel::new(dapr.clone())
        .and_then(|email| PushChannel::new(dapr.clone()).map(|push| (email, push)));
    let (email, push) = match channels {
        Ok((email, push)) => (Arc::new(email), Arc::new(push)),
        Err(e) => {
            tracing::error!("Failed to construct notification channels: {:?}", e);
            std::process::exit(EXIT_DEPENDENCY);
        }
    };
    let limits = ConsumerLimits::new(config.consumers.topic_concurrency);

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        dapr,
        state_store,
        publisher,
        email,
        push,
        limits,
    });

    // Spawn background workers (reminder sweep)
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let workers = services::init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    let app = build_router(app_state.clone());

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    tracing::info!("Server listening on {}", addr);

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        tracing::error!("Server error: {}", e);
        std::process::exit(EXIT_DEPENDENCY);
    }

    // Stop accepting happened above; now drain workers up to the grace
    // period, then let the process exit (aborting whatever is left).
    let _ = shutdown_tx.send(());
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    if tokio::time::timeout(grace, futures::future::join_all(workers))
        .await
        .is_err()
    {
        tracing::warn!("Background workers did not stop within grace period, aborting");
    }

    tracing::info!("Shutdown complete");
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Liveness / readiness
        .route("/health", get(routes::health::health_check))
        .route("/health/ready", get(routes::health::readiness_check))
        // Broker-facing: subscription discovery + per-topic delivery routes
        .merge(routes::subscriptions::router())
        // Task API (incl. reminder + recurrence endpoints)
        .nest("/api/tasks", routes::tasks::router())
        // Category API
        .nest("/api/categories", routes::categories::router())
        // Cron-binding callbacks
        .nest("/api/jobs", routes::jobs::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, draining in-flight work");
}
