//! Services layer - Business logic
//!
//! Services own the rules of the system:
//! - Authentication and account management (`user`)
//! - Blog post CRUD with sanitization and object-level authorization (`blog`)
//! - The pure building blocks they compose: password hashing, token
//!   generation, field validation, HTML sanitization and the write policy

pub mod blog;
pub mod password;
pub mod permission;
pub mod sanitizer;
pub mod token;
pub mod user;
pub mod validation;

pub use blog::{AuthoredPost, BlogService, BlogServiceError};
pub use password::{hash_password, verify_password};
pub use permission::{Authored, WritePolicy};
pub use sanitizer::sanitize;
pub use user::{UserService, UserServiceError};
pub use validation::{FieldErrors, PasswordPolicy};
