use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};

use crate::db::models::{NewTask, Task, TaskPatch};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::tasks::TaskService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_task).get(list_tasks))
        .route("/:id", get(get_task).put(update_task).delete(delete_task))
        .route("/:id/complete", patch(complete_task))
        .merge(super::reminders::router())
        .merge(super::recurring::router())
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<NewTask>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let task = TaskService::new(&state).create_task(&user_id, input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<Task>>> {
    let tasks = TaskService::new(&state).list_tasks(&user_id).await?;
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Task>> {
    let task = TaskService::new(&state).get_task(&user_id, &id).await?;
    Ok(Json(task))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> AppResult<Json<Task>> {
    let task = TaskService::new(&state)
        .update_task(&user_id, &id, patch)
        .await?;
    Ok(Json(task))
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Task>> {
    let task = TaskService::new(&state).complete_task(&user_id, &id).await?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    TaskService::new(&state).delete_task(&user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
