//! Data models
//!
//! Database entities and the request types that create them:
//! - `User` and its registration/login inputs
//! - `AuthToken` and the one-time `IssuedToken`
//! - `BlogPost` and its create/update inputs

mod blog;
mod token;
mod user;

pub use blog::{BlogListParams, BlogPost, BlogPostInput, CreateBlogInput, UpdateBlogInput};
pub use token::{AuthToken, IssuedToken};
pub use user::{CreateUserInput, LoginInput, RegisterInput, User};
