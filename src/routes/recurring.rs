use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::db::models::{NewRecurringTask, RecurringTask};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::recurring::RecurringService;
use crate::AppState;

/// Mounted under `/api/tasks`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/:id/recurring",
        post(create_rule).get(get_rule).delete(cancel_rule),
    )
}

async fn create_rule(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<String>,
    Json(input): Json<NewRecurringTask>,
) -> AppResult<(StatusCode, Json<RecurringTask>)> {
    let rule = RecurringService::new(&state)
        .create_rule(&user_id, &task_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn get_rule(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<String>,
) -> AppResult<Json<RecurringTask>> {
    let rule = RecurringService::new(&state)
        .get_rule(&user_id, &task_id)
        .await?;
    Ok(Json(rule))
}

async fn cancel_rule(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<String>,
) -> AppResult<StatusCode> {
    RecurringService::new(&state)
        .cancel_rule(&user_id, &task_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
