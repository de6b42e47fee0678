use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};

use crate::db::models::{sanitize_category_name, validate_color, NewTaskCategory, TaskCategory};
use crate::db::CategoryRepository;
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_category).get(list_categories))
        .route("/:id", delete(delete_category))
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<NewTaskCategory>,
) -> AppResult<(StatusCode, Json<TaskCategory>)> {
    let name = sanitize_category_name(&input.name)?;
    let color = validate_color(&input.color)?;

    let category = CategoryRepository::create(&state.db, &user_id, name, color).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<TaskCategory>>> {
    let categories = CategoryRepository::list_by_user(&state.db, &user_id).await?;
    Ok(Json(categories))
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let category = CategoryRepository::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;
    if category.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    CategoryRepository::delete(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
