//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api`:
//! - Auth endpoints (register, login, logout, logout-all)
//! - User listing
//! - Blog post CRUD with search

pub mod auth;
pub mod blog;
pub mod middleware;
pub mod responses;
pub mod users;

#[cfg(test)]
mod tests;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{Actor, ApiError, AppState, AuthenticatedUser};

/// Build the API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid token)
    let protected_routes = Router::new()
        .merge(auth::protected_router())
        .merge(users::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Blog routes resolve the caller if they can; the service decides
    let blog_routes = blog::router().route_layer(axum_middleware::from_fn_with_state(
        state,
        middleware::optional_auth,
    ));

    // Public routes
    Router::new()
        .merge(auth::public_router())
        .merge(blog_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware.
///
/// `cors_origin` of `*` allows any origin without credentials; anything else
/// must be a single origin, which is then allowed to send cookies.
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE]);

    let cors = if cors_origin == "*" {
        cors.allow_origin(AllowOrigin::any())
    } else {
        let origin = cors_origin
            .parse::<HeaderValue>()
            .with_context(|| format!("Invalid CORS origin: {cors_origin}"))?;
        cors.allow_origin(origin).allow_credentials(true)
    };

    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
