//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /api/register - Create an account and receive a token
//! - POST /api/login - Exchange credentials for a token
//! - POST /api/logout - Revoke the presented token
//! - POST /api/logout/all - Revoke every token of the caller

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, SESSION_COOKIE};
use crate::api::responses::{LoginResponse, RegisterResponse};
use crate::models::{LoginInput, RegisterInput};

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/logout/all", post(logout_all))
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// POST /api/register
async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;

    let (user, issued) = state.user_service.register(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.into(),
            message: "User created".to_string(),
            token: issued.token,
        }),
    ))
}

/// POST /api/login
///
/// Besides the JSON token, sets an HttpOnly session cookie carrying the same
/// token for browser clients.
async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;

    let (user, issued) = state.user_service.login(body).await?;

    let cookie = session_cookie(&issued.token, issued.expiry, Utc::now());
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|_| ApiError::internal_error("Failed to build session cookie"))?,
    );

    Ok((headers, Json(LoginResponse::new(user, issued))))
}

/// POST /api/logout
async fn logout(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    state.user_service.logout(&auth.token).await?;
    Ok((StatusCode::NO_CONTENT, clear_cookie_headers()))
}

/// POST /api/logout/all
async fn logout_all(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    state.user_service.logout_all(auth.user.id).await?;
    Ok((StatusCode::NO_CONTENT, clear_cookie_headers()))
}

/// `Set-Cookie` value for a freshly issued token. A token without expiry
/// gets a browser-session cookie.
fn session_cookie(token: &str, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let mut cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(expiry) = expiry {
        let max_age = (expiry - now).num_seconds().max(0);
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    cookie
}

fn clear_cookie_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    headers
}
