//! User API endpoints
//!
//! - GET /api/users - List active users (authenticated)

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::UserResponse;

/// Build the users router (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new().route("/users", get(list_users))
}

/// GET /api/users
async fn list_users(
    State(state): State<AppState>,
    _auth: AuthenticatedUser,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.user_service.list_active_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}
