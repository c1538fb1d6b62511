//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The uniform JSON error type and service error mapping
//! - Token extraction and the authentication middlewares
//! - Extractors for the authenticated (or anonymous) caller

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{SqlxBlogRepository, SqlxTokenRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{BlogService, BlogServiceError, FieldErrors, UserService, UserServiceError};

/// Name of the cookie carrying the token for browser clients
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub blog_service: Arc<BlogService>,
}

impl AppState {
    /// Wire repositories and services over a migrated pool
    pub fn from_config(pool: DynDatabasePool, config: &Config) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let token_repo = SqlxTokenRepository::boxed(pool.clone());
        let blog_repo = SqlxBlogRepository::boxed(pool);

        let user_service = UserService::with_config(user_repo.clone(), token_repo, &config.auth);
        let blog_service = BlogService::with_policy(blog_repo, user_repo, config.blog.write_policy);

        Self {
            user_service: Arc::new(user_service),
            blog_service: Arc::new(blog_service),
        }
    }
}

/// Authenticated caller, with the token they presented
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub token: String,
}

/// The caller, if a valid token was presented
#[derive(Debug, Clone, Default)]
pub struct Actor(pub Option<User>);

impl Actor {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Per-field validation failures, reported under `details`
    pub fn field_errors(errors: &FieldErrors) -> Self {
        Self::with_details(
            "VALIDATION_ERROR",
            "Invalid input",
            serde_json::to_value(errors).unwrap_or_default(),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::Validation(errors) => ApiError::field_errors(&errors),
            UserServiceError::Authentication(message) => ApiError::unauthorized(message),
            UserServiceError::Internal(e) => {
                tracing::error!("User service failure: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<BlogServiceError> for ApiError {
    fn from(e: BlogServiceError) -> Self {
        match e {
            BlogServiceError::NotFound(_) => ApiError::not_found("Not found."),
            BlogServiceError::NotAuthenticated => {
                ApiError::unauthorized("Authentication credentials were not provided.")
            }
            BlogServiceError::PermissionDenied => {
                ApiError::forbidden("You do not have permission to perform this action.")
            }
            BlogServiceError::Validation(errors) => ApiError::field_errors(&errors),
            BlogServiceError::Internal(e) => {
                tracing::error!("Blog service failure: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation_error(rejection.body_text())
    }
}

/// Extract the presented token.
///
/// Accepts `Authorization: Bearer <t>`, `Authorization: Token <t>` and the
/// session cookie, in that order.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_str) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        let token = auth_str
            .strip_prefix("Bearer ")
            .or_else(|| auth_str.strip_prefix("Token "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if let Some(token) = token {
            return Some(token.to_string());
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
        .next()
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))?;

    let user = state
        .user_service
        .authenticate_token(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid token."))?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user, token });
    Ok(next.run(request).await)
}

/// Optional authentication middleware
///
/// Invalid or expired tokens are ignored; the request continues anonymously.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(request.headers()) {
        match state.user_service.authenticate_token(&token).await {
            Ok(Some(user)) => {
                request
                    .extensions_mut()
                    .insert(AuthenticatedUser { user, token });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Token lookup failed: {}", e),
        }
    }
    next.run(request).await
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Actor(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|auth| auth.user.clone()),
        ))
    }
}
