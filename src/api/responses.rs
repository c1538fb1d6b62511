//! Shared API response types
//!
//! Users and posts are serialized the same way everywhere they appear,
//! including the author nested inside every post.

use serde::{Deserialize, Serialize};

use crate::models::{IssuedToken, User};
use crate::services::AuthoredPost;

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub pk: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            pk: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

/// A blog post with its author
#[derive(Debug, Serialize, Deserialize)]
pub struct BlogPostResponse {
    pub pk: i64,
    pub author: UserResponse,
    pub title: String,
    pub content: String,
    pub created: String,
    pub updated: String,
}

impl From<AuthoredPost> for BlogPostResponse {
    fn from(AuthoredPost { post, author }: AuthoredPost) -> Self {
        Self {
            pk: post.id,
            author: author.into(),
            title: post.title,
            content: post.content,
            created: post.created.to_rfc3339(),
            updated: post.updated.to_rfc3339(),
        }
    }
}

/// POST /api/login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub expiry: Option<String>,
    pub token: String,
    pub user: UserResponse,
}

impl LoginResponse {
    pub fn new(user: User, issued: IssuedToken) -> Self {
        Self {
            expiry: issued.expiry.map(|dt| dt.to_rfc3339()),
            token: issued.token,
            user: user.into(),
        }
    }
}

/// POST /api/register
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
    pub message: String,
    pub token: String,
}
