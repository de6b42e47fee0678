//! Caller identity. Authentication itself happens upstream (gateway /
//! session service); by the time a request reaches this service the
//! authenticated user id is carried in the `x-user-id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Extracts the authenticated user id; rejects requests without one.
pub struct AuthUser(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match user_id {
            Some(user_id) => Ok(AuthUser(user_id.to_string())),
            None => Err(AppError::Unauthorized),
        }
    }
}
