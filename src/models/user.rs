//! User model
//!
//! Users are identified by their email address; the username is always a copy
//! of the email and is never supplied by clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Login name, always equal to `email`
    pub username: String,
    /// Email address (unique)
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Inactive accounts cannot log in and their tokens are rejected
    pub is_active: bool,
    /// Superusers may modify any blog post under the default write policy
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new, active, non-superuser account.
    ///
    /// The password must already be hashed; see `services::password::hash_password`.
    pub fn new(email: String, first_name: String, last_name: String, password_hash: String) -> Self {
        Self {
            id: 0, // Will be set by the database
            username: email.clone(),
            email,
            first_name,
            last_name,
            password_hash,
            is_active: true,
            is_superuser: false,
            date_joined: Utc::now(),
            last_login: None,
        }
    }
}

/// Validated data for inserting a user row.
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_superuser: bool,
}

/// Registration request body.
///
/// Every field is optional at the wire level so that a missing field is
/// reported as a field error rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterInput {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Login request body
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}
