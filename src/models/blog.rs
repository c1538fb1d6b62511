//! Blog post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::permission::Authored;

/// A blog post owned by the user who created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: i64,
    /// Set once at creation to the creating user; never changed afterwards
    pub author_id: i64,
    pub title: String,
    /// Sanitized HTML
    pub content: String,
    pub created: DateTime<Utc>,
    /// Refreshed on every mutation
    pub updated: DateTime<Utc>,
}

impl Authored for BlogPost {
    fn author_id(&self) -> i64 {
        self.author_id
    }
}

/// Request body for creating or updating a post.
///
/// Unknown fields such as `author`, `pk` or `created` are ignored, so the
/// author can never be supplied by the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlogPostInput {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Validated, sanitized data for inserting a post.
#[derive(Debug, Clone)]
pub struct CreateBlogInput {
    pub title: String,
    pub content: String,
}

/// Validated, sanitized changes to a post. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateBlogInput {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Query parameters for listing posts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlogListParams {
    /// Case-insensitive substring matched against title and content
    pub search: Option<String>,
}

impl BlogListParams {
    /// The search term, if it has any non-whitespace content
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}
