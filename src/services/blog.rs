//! Blog service
//!
//! CRUD over blog posts. Content is sanitized once, on write. Every mutation
//! of an existing post is checked against that specific post with the
//! configured [`WritePolicy`].

use crate::db::repositories::{BlogRepository, UserRepository};
use crate::models::{
    BlogListParams, BlogPost, BlogPostInput, CreateBlogInput, UpdateBlogInput, User,
};
use crate::services::permission::WritePolicy;
use crate::services::sanitizer::sanitize;
use crate::services::validation::{FieldErrors, BLANK, REQUIRED};
use anyhow::Context;
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// Longest accepted title, in characters
pub const MAX_TITLE_LENGTH: usize = 255;

/// Error types for blog service operations
#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("Blog post not found: {0}")]
    NotFound(i64),

    /// A write was attempted without a valid token
    #[error("Authentication credentials were not provided")]
    NotAuthenticated,

    /// The actor may not modify this post
    #[error("You do not have permission to perform this action")]
    PermissionDenied,

    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// A post together with its author
#[derive(Debug, Clone)]
pub struct AuthoredPost {
    pub post: BlogPost,
    pub author: User,
}

/// Blog service
pub struct BlogService {
    blog_repo: Arc<dyn BlogRepository>,
    user_repo: Arc<dyn UserRepository>,
    policy: WritePolicy,
}

impl BlogService {
    pub fn new(blog_repo: Arc<dyn BlogRepository>, user_repo: Arc<dyn UserRepository>) -> Self {
        Self::with_policy(blog_repo, user_repo, WritePolicy::default())
    }

    pub fn with_policy(
        blog_repo: Arc<dyn BlogRepository>,
        user_repo: Arc<dyn UserRepository>,
        policy: WritePolicy,
    ) -> Self {
        Self {
            blog_repo,
            user_repo,
            policy,
        }
    }

    /// All posts, newest first, optionally filtered by a search term
    pub async fn list(&self, params: &BlogListParams) -> Result<Vec<AuthoredPost>, BlogServiceError> {
        let posts = self
            .blog_repo
            .list(params.search_term())
            .await
            .context("Failed to list blog posts")?;

        let mut authors: HashMap<i64, User> = HashMap::new();
        let mut result = Vec::with_capacity(posts.len());
        for post in posts {
            let author = match authors.get(&post.author_id) {
                Some(author) => author.clone(),
                None => {
                    let author = self.load_author(&post).await?;
                    authors.insert(author.id, author.clone());
                    author
                }
            };
            result.push(AuthoredPost { post, author });
        }

        Ok(result)
    }

    /// A single post
    pub async fn get(&self, id: i64) -> Result<AuthoredPost, BlogServiceError> {
        let post = self.find(id).await?;
        let author = self.load_author(&post).await?;
        Ok(AuthoredPost { post, author })
    }

    /// Create a post owned by `actor`.
    ///
    /// Any author supplied by the client is ignored.
    pub async fn create(
        &self,
        actor: Option<&User>,
        input: BlogPostInput,
    ) -> Result<AuthoredPost, BlogServiceError> {
        let actor = actor.ok_or(BlogServiceError::NotAuthenticated)?;

        let changes = clean_input(input, false)?;
        let (Some(title), Some(content)) = (changes.title, changes.content) else {
            // Full validation guarantees both fields.
            return Err(anyhow::anyhow!("validated post input is incomplete").into());
        };

        let post = self
            .blog_repo
            .create(actor.id, &CreateBlogInput { title, content })
            .await
            .context("Failed to create blog post")?;

        tracing::info!(post_id = post.id, author_id = actor.id, "Blog post created");
        Ok(AuthoredPost {
            post,
            author: actor.clone(),
        })
    }

    /// Replace (`partial == false`) or patch (`partial == true`) a post.
    ///
    /// Checks run in order: the post must exist, the actor must be
    /// authenticated, the policy must allow the write, the input must be valid.
    pub async fn update(
        &self,
        id: i64,
        actor: Option<&User>,
        input: BlogPostInput,
        partial: bool,
    ) -> Result<AuthoredPost, BlogServiceError> {
        let method = if partial { Method::PATCH } else { Method::PUT };
        let post = self.find(id).await?;
        self.authorize(&method, actor, &post)?;

        let changes = clean_input(input, partial)?;
        let updated = self
            .blog_repo
            .update(id, &changes)
            .await
            .context("Failed to update blog post")?
            .ok_or(BlogServiceError::NotFound(id))?;

        tracing::info!(post_id = id, "Blog post updated");
        let author = self.load_author(&updated).await?;
        Ok(AuthoredPost {
            post: updated,
            author,
        })
    }

    /// Delete a post after the same checks as [`BlogService::update`]
    pub async fn delete(&self, id: i64, actor: Option<&User>) -> Result<(), BlogServiceError> {
        let post = self.find(id).await?;
        self.authorize(&Method::DELETE, actor, &post)?;

        if !self
            .blog_repo
            .delete(id)
            .await
            .context("Failed to delete blog post")?
        {
            return Err(BlogServiceError::NotFound(id));
        }

        tracing::info!(post_id = id, "Blog post deleted");
        Ok(())
    }

    /// Run the existence and authorization checks of an update without
    /// changing anything
    pub async fn check_write(
        &self,
        id: i64,
        actor: Option<&User>,
        partial: bool,
    ) -> Result<(), BlogServiceError> {
        let method = if partial { Method::PATCH } else { Method::PUT };
        let post = self.find(id).await?;
        self.authorize(&method, actor, &post)
    }

    async fn find(&self, id: i64) -> Result<BlogPost, BlogServiceError> {
        self.blog_repo
            .get_by_id(id)
            .await
            .context("Failed to get blog post")?
            .ok_or(BlogServiceError::NotFound(id))
    }

    fn authorize(
        &self,
        method: &Method,
        actor: Option<&User>,
        post: &BlogPost,
    ) -> Result<(), BlogServiceError> {
        if actor.is_none() {
            return Err(BlogServiceError::NotAuthenticated);
        }
        if !self.policy.can_write(method, actor, post) {
            tracing::warn!(post_id = post.id, "Blog write denied by policy");
            return Err(BlogServiceError::PermissionDenied);
        }
        Ok(())
    }

    async fn load_author(&self, post: &BlogPost) -> Result<User, BlogServiceError> {
        let author = self
            .user_repo
            .get_by_id(post.author_id)
            .await
            .context("Failed to load post author")?;

        author
            .with_context(|| format!("Author {} of post {} is missing", post.author_id, post.id))
            .map_err(BlogServiceError::Internal)
    }
}

/// Validate and sanitize request fields.
///
/// With `partial == false` both fields are required; otherwise only supplied
/// fields are checked. Titles and content are trimmed, and content is
/// sanitized before the blank check so markup that is stripped entirely
/// counts as blank.
fn clean_input(input: BlogPostInput, partial: bool) -> Result<UpdateBlogInput, BlogServiceError> {
    let mut errors = FieldErrors::new();

    let title = match input.title.as_deref().map(str::trim) {
        None if !partial => {
            errors.add("title", REQUIRED);
            None
        }
        None => None,
        Some("") => {
            errors.add("title", BLANK);
            None
        }
        Some(title) if title.chars().count() > MAX_TITLE_LENGTH => {
            errors.add(
                "title",
                format!(
                    "Ensure this field has no more than {} characters.",
                    MAX_TITLE_LENGTH
                ),
            );
            None
        }
        Some(title) => Some(title.to_string()),
    };

    let content = match input.content.as_deref() {
        None if !partial => {
            errors.add("content", REQUIRED);
            None
        }
        None => None,
        Some(raw) => {
            let cleaned = sanitize(raw.trim());
            if cleaned.trim().is_empty() {
                errors.add("content", BLANK);
                None
            } else {
                Some(cleaned)
            }
        }
    };

    errors.into_result().map_err(BlogServiceError::Validation)?;
    Ok(UpdateBlogInput { title, content })
}
