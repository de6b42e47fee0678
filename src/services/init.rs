//! Initialization helpers for the application:
//! - database connection + migrations
//! - background worker spawn helpers
//!
//! This module centralizes bits that would otherwise live in `main.rs`.

use std::{path::Path, sync::Arc};

use anyhow::Result;

use crate::config::Config;

/// Redact potentially sensitive information from a database URL before
/// logging: drops any userinfo (username:password) component.
pub fn redact_db_url(db_url: &str) -> String {
    match db_url.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{}://(redacted)@{}", scheme, host),
            None => db_url.to_string(),
        },
        None => "(redacted)".to_string(),
    }
}

/// Initialize the SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs
/// migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if db_path != ":memory:" {
        if let Some(parent) = db_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    )
                })?;
            }
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Spawn background workers:
/// - the periodic reminder sweep
///
/// Workers are `tokio::spawn` tasks; the function returns their
/// `JoinHandle`s so the caller can await shutdown. Each worker listens for
/// a shutdown notification via a `tokio::sync::broadcast::Sender<()>`.
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    // Reminder sweep worker
    if state.config.reminders.sweep_enabled {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let interval =
                std::time::Duration::from_secs(state.config.reminders.sweep_interval_seconds);
            loop {
                tracing::debug!("Running reminder sweep");

                let service = crate::services::reminders::ReminderService::new(&state);
                match service.sweep().await {
                    Ok(report) => {
                        if report.published > 0 || report.suppressed > 0 || report.failed > 0 {
                            tracing::info!(
                                published = report.published,
                                suppressed = report.suppressed,
                                failed = report.failed,
                                "Reminder sweep finished"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Reminder sweep failed: {:?}", e);
                    }
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Reminder sweep worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }));
    }

    handles
}
