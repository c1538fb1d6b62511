//! Blog API endpoints
//!
//! - GET /api/blog - List posts, newest first, with optional `?search=`
//! - POST /api/blog - Create a post owned by the caller
//! - GET /api/blog/{id} - Get a post
//! - PUT /api/blog/{id} - Replace title and content
//! - PATCH /api/blog/{id} - Update the supplied fields
//! - DELETE /api/blog/{id} - Delete a post
//!
//! Every route runs under optional authentication. Whether a write is allowed
//! is decided by the blog service, after the post has been looked up.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{Actor, ApiError, AppState};
use crate::api::responses::BlogPostResponse;
use crate::models::{BlogListParams, BlogPostInput};

/// Build the blog router (requires the optional auth middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/blog", get(list_posts).post(create_post))
        .route(
            "/blog/{id}",
            get(get_post)
                .put(replace_post)
                .patch(patch_post)
                .delete(delete_post),
        )
}

/// A non-numeric id cannot name a post.
fn post_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::not_found("Not found."))
}

/// GET /api/blog
async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<BlogListParams>,
) -> Result<Json<Vec<BlogPostResponse>>, ApiError> {
    let posts = state.blog_service.list(&params).await?;
    Ok(Json(posts.into_iter().map(BlogPostResponse::from).collect()))
}

/// POST /api/blog
async fn create_post(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<BlogPostInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    // Anonymous callers get 401 even when the body is malformed.
    if actor.user().is_none() {
        return Err(ApiError::unauthorized(
            "Authentication credentials were not provided.",
        ));
    }
    let Json(input) = payload?;

    let post = state.blog_service.create(actor.user(), input).await?;
    Ok((StatusCode::CREATED, Json(BlogPostResponse::from(post))))
}

/// GET /api/blog/{id}
async fn get_post(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<BlogPostResponse>, ApiError> {
    let id = post_id(path)?;
    let post = state.blog_service.get(id).await?;
    Ok(Json(post.into()))
}

/// PUT /api/blog/{id}
async fn replace_post(
    state: State<AppState>,
    actor: Actor,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BlogPostInput>, JsonRejection>,
) -> Result<Json<BlogPostResponse>, ApiError> {
    update_post(state, actor, path, payload, false).await
}

/// PATCH /api/blog/{id}
async fn patch_post(
    state: State<AppState>,
    actor: Actor,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BlogPostInput>, JsonRejection>,
) -> Result<Json<BlogPostResponse>, ApiError> {
    update_post(state, actor, path, payload, true).await
}

async fn update_post(
    State(state): State<AppState>,
    actor: Actor,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BlogPostInput>, JsonRejection>,
    partial: bool,
) -> Result<Json<BlogPostResponse>, ApiError> {
    let id = post_id(path)?;
    // A malformed body is reported only once lookup and authorization pass.
    let input = match payload {
        Ok(Json(input)) => input,
        Err(rejection) => {
            state
                .blog_service
                .check_write(id, actor.user(), partial)
                .await?;
            return Err(rejection.into());
        }
    };

    let post = state
        .blog_service
        .update(id, actor.user(), input, partial)
        .await?;
    Ok(Json(post.into()))
}

/// DELETE /api/blog/{id}
async fn delete_post(
    State(state): State<AppState>,
    actor: Actor,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = post_id(path)?;
    state.blog_service.delete(id, actor.user()).await?;
    Ok(StatusCode::NO_CONTENT)
}
