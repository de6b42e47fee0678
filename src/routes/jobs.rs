//! Cron-binding callback entry points. The scheduler component POSTs to
//! `/api/jobs/<name>` on its schedule; handlers run the same code as the
//! internal workers, so either trigger keeps the system moving.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::services::reminders::ReminderService;
use crate::AppState;

pub const JOB_REMINDER_SWEEP: &str = "reminder-sweep";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/:name", post(run_job))
}

async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    match name.as_str() {
        JOB_REMINDER_SWEEP => {
            let report = ReminderService::new(&state).sweep().await?;
            tracing::info!(
                published = report.published,
                suppressed = report.suppressed,
                failed = report.failed,
                "Reminder sweep triggered by cron binding"
            );
            Ok(Json(json!({
                "job": name,
                "published": report.published,
                "suppressed": report.suppressed,
                "failed": report.failed,
            })))
        }
        _ => Err(AppError::NotFound(format!("Unknown job: {}", name))),
    }
}
