use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use crate::db::models::{NewReminder, Reminder};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::reminders::ReminderService;
use crate::AppState;

/// Mounted under `/api/tasks`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id/reminder", post(schedule_reminder))
        .route("/:id/reminders", get(list_reminders))
        .route("/reminders/:id", delete(delete_reminder))
}

async fn schedule_reminder(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<String>,
    Json(input): Json<NewReminder>,
) -> AppResult<(StatusCode, Json<Reminder>)> {
    let reminder = ReminderService::new(&state)
        .schedule(&user_id, &task_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

async fn list_reminders(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<String>,
) -> AppResult<Json<Vec<Reminder>>> {
    let reminders = ReminderService::new(&state)
        .list_for_task(&user_id, &task_id)
        .await?;
    Ok(Json(reminders))
}

async fn delete_reminder(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(reminder_id): Path<String>,
) -> AppResult<StatusCode> {
    ReminderService::new(&state)
        .delete(&user_id, &reminder_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
