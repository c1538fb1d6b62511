//! Object-level write authorization for blog posts
//!
//! The policy is a pure predicate over the request method, the acting user
//! and the resource. Handlers call it after loading the resource, so every
//! mutation is checked against the specific record it touches.

use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::models::User;

/// A resource owned by exactly one user.
pub trait Authored {
    fn author_id(&self) -> i64;
}

/// Who may mutate a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// The author, or any superuser
    #[default]
    AuthorOrAdmin,
    /// The author only; superusers get no override
    AuthorOnly,
}

impl WritePolicy {
    /// Parse the configuration spelling of a policy
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "author_or_admin" => Some(Self::AuthorOrAdmin),
            "author_only" => Some(Self::AuthorOnly),
            _ => None,
        }
    }

    /// Decide whether `actor` may perform `method` on `resource`.
    ///
    /// Safe methods are always allowed, including for anonymous actors.
    /// Everything else needs an authenticated actor who satisfies the policy.
    pub fn can_write<R: Authored + ?Sized>(
        self,
        method: &Method,
        actor: Option<&User>,
        resource: &R,
    ) -> bool {
        if is_safe_method(method) {
            return true;
        }

        let Some(actor) = actor else {
            return false;
        };

        if actor.id == resource.author_id() {
            return true;
        }

        match self {
            Self::AuthorOrAdmin => actor.is_superuser,
            Self::AuthorOnly => false,
        }
    }
}

/// Methods that never mutate state
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
