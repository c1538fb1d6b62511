//! User service
//!
//! Implements account and authentication logic:
//! - Registration with field validation and password policy
//! - Login, issuing an opaque bearer token
//! - Logout of a single token or of every token a user holds
//! - Token validation for incoming requests
//! - Superuser bootstrap from configuration

use crate::config::{AdminConfig, AuthConfig};
use crate::db::repositories::{TokenRepository, UserRepository};
use crate::models::{AuthToken, CreateUserInput, IssuedToken, LoginInput, RegisterInput, User};
use crate::services::password::{hash_password, verify_dummy, verify_password};
use crate::services::token::{digest_token, generate_token, is_well_formed, token_key};
use crate::services::validation::{
    validate_email, validate_name, FieldErrors, PasswordPolicy, BLANK, NOT_UNIQUE, REQUIRED,
};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Message for every failed login, whatever the cause
pub const INVALID_CREDENTIALS: &str = "Unable to log in with provided credentials.";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// One or more fields failed validation
    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// User service for managing accounts and authentication tokens
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    token_repo: Arc<dyn TokenRepository>,
    token_ttl_hours: i64,
    password_policy: PasswordPolicy,
}

impl UserService {
    /// Create a user service with default authentication settings
    pub fn new(user_repo: Arc<dyn UserRepository>, token_repo: Arc<dyn TokenRepository>) -> Self {
        Self::with_config(user_repo, token_repo, &AuthConfig::default())
    }

    pub fn with_config(
        user_repo: Arc<dyn UserRepository>,
        token_repo: Arc<dyn TokenRepository>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            token_repo,
            token_ttl_hours: config.token_ttl_hours,
            password_policy: PasswordPolicy::with_min_length(config.min_password_length),
        }
    }

    /// Register a new account and issue its first token.
    ///
    /// All field problems are reported together. No user is created when
    /// validation fails.
    ///
    /// # Errors
    ///
    /// - `Validation` with per-field messages
    /// - `Internal` for database errors
    pub async fn register(
        &self,
        input: RegisterInput,
    ) -> Result<(User, IssuedToken), UserServiceError> {
        let mut errors = FieldErrors::new();

        let email = input.email.as_deref().map(str::trim);
        match email {
            None => errors.add("email", REQUIRED),
            Some("") => errors.add("email", BLANK),
            Some(email) => {
                if let Err(message) = validate_email(email) {
                    errors.add("email", message);
                } else if self
                    .user_repo
                    .email_exists(email)
                    .await
                    .context("Failed to check email")?
                {
                    errors.add("email", NOT_UNIQUE);
                }
            }
        }

        let first_name = input.first_name.as_deref().unwrap_or_default().trim();
        if let Err(message) = validate_name("First name", first_name) {
            errors.add("first_name", message);
        }

        let last_name = input.last_name.as_deref().unwrap_or_default().trim();
        if let Err(message) = validate_name("Last name", last_name) {
            errors.add("last_name", message);
        }

        match input.password.as_deref() {
            None => errors.add("password", REQUIRED),
            Some("") => errors.add("password", BLANK),
            Some(password) => {
                let attributes = [
                    ("email address", email.unwrap_or_default()),
                    ("first name", first_name),
                    ("last name", last_name),
                ];
                if let Err(messages) = self.password_policy.validate(password, &attributes) {
                    errors.extend("password", messages);
                }
            }
        }

        errors.into_result().map_err(UserServiceError::Validation)?;

        // Validation passed, so every field is present.
        let email = email.unwrap_or_default().to_string();
        let password = input.password.unwrap_or_default();

        let password_hash = hash_password(&password).context("Failed to hash password")?;
        let user = match self
            .user_repo
            .create(&CreateUserInput {
                email: email.clone(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                password_hash,
                is_superuser: false,
            })
            .await
        {
            Ok(user) => user,
            // A concurrent registration may have claimed the email since the check.
            Err(e) => {
                if self.user_repo.email_exists(&email).await.unwrap_or(false) {
                    return Err(UserServiceError::Validation(FieldErrors::single(
                        "email", NOT_UNIQUE,
                    )));
                }
                return Err(e.context("Failed to create user").into());
            }
        };

        let token = self.issue_token(&user).await?;
        tracing::info!(user_id = user.id, "User registered");

        Ok((user, token))
    }

    /// Check credentials and issue a new token.
    ///
    /// Unknown accounts, wrong passwords and inactive accounts all fail with
    /// the same message.
    pub async fn login(&self, input: LoginInput) -> Result<(User, IssuedToken), UserServiceError> {
        let username = input.username.trim();
        let mut errors = FieldErrors::new();
        if username.is_empty() {
            errors.add("username", BLANK);
        }
        if input.password.is_empty() {
            errors.add("password", BLANK);
        }
        errors.into_result().map_err(UserServiceError::Validation)?;

        let user = self
            .user_repo
            .get_by_email(username)
            .await
            .context("Failed to look up user")?;

        let Some(mut user) = user else {
            verify_dummy(&input.password);
            tracing::warn!("Login failed: unknown account");
            return Err(UserServiceError::Authentication(INVALID_CREDENTIALS.to_string()));
        };

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;

        if !password_valid || !user.is_active {
            tracing::warn!(user_id = user.id, "Login failed");
            return Err(UserServiceError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        let now = Utc::now();
        self.user_repo
            .update_last_login(user.id, now)
            .await
            .context("Failed to record login")?;
        user.last_login = Some(now);

        let token = self.issue_token(&user).await?;
        tracing::info!(user_id = user.id, "User logged in");

        Ok((user, token))
    }

    /// Issue a new token for a user. The plaintext is only available here.
    pub async fn issue_token(&self, user: &User) -> Result<IssuedToken, UserServiceError> {
        let token = generate_token();
        let now = Utc::now();
        let expiry = Duration::try_hours(self.token_ttl_hours)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .context("Token lifetime is out of range")?;

        self.token_repo
            .create(&AuthToken {
                digest: digest_token(&token),
                token_key: token_key(&token).to_string(),
                user_id: user.id,
                created: now,
                expiry: Some(expiry),
            })
            .await
            .context("Failed to store token")?;

        Ok(IssuedToken {
            token,
            expiry: Some(expiry),
        })
    }

    /// Resolve a presented token to its active owner.
    ///
    /// Returns `None` for unknown, expired or inactive-owner tokens. Expired
    /// tokens are deleted as they are found.
    pub async fn authenticate_token(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        if !is_well_formed(token) {
            return Ok(None);
        }

        let digest = digest_token(token);
        let Some(stored) = self
            .token_repo
            .get_by_digest(&digest)
            .await
            .context("Failed to look up token")?
        else {
            return Ok(None);
        };

        if stored.is_expired() {
            self.token_repo
                .delete(&digest)
                .await
                .context("Failed to delete expired token")?;
            tracing::debug!(user_id = stored.user_id, "Rejected expired token");
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(stored.user_id)
            .await
            .context("Failed to load token owner")?;

        Ok(user.filter(|u| u.is_active))
    }

    /// Revoke the presented token only. Returns whether it existed.
    pub async fn logout(&self, token: &str) -> Result<bool, UserServiceError> {
        let removed = self
            .token_repo
            .delete(&digest_token(token))
            .await
            .context("Failed to delete token")?;

        tracing::info!("Token revoked");
        Ok(removed)
    }

    /// Revoke every token a user holds. Returns how many were removed.
    pub async fn logout_all(&self, user_id: i64) -> Result<u64, UserServiceError> {
        let removed = self
            .token_repo
            .delete_by_user(user_id)
            .await
            .context("Failed to delete tokens")?;

        tracing::info!(user_id, removed, "All tokens revoked");
        Ok(removed)
    }

    /// Active users, oldest account first
    pub async fn list_active_users(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self
            .user_repo
            .list_active()
            .await
            .context("Failed to list users")?)
    }

    /// Make sure the configured admin account exists and is a superuser.
    ///
    /// Creates the account on first run and promotes an existing account with
    /// the same email. Returns `None` when no admin is configured.
    pub async fn ensure_superuser(
        &self,
        admin: &AdminConfig,
    ) -> Result<Option<User>, UserServiceError> {
        let Some((email, password)) = admin.credentials() else {
            return Ok(None);
        };

        validate_email(email)
            .map_err(|message| UserServiceError::Validation(FieldErrors::single("email", message)))?;

        if let Some(mut existing) = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to look up admin")?
        {
            if !existing.is_superuser {
                self.user_repo
                    .set_superuser(existing.id, true)
                    .await
                    .context("Failed to promote admin")?;
                existing.is_superuser = true;
                tracing::info!(user_id = existing.id, "Promoted configured admin to superuser");
            }
            return Ok(Some(existing));
        }

        if self.password_policy.validate(password, &[]).is_err() {
            tracing::warn!("Configured admin password does not meet the password policy");
        }

        let user = self
            .user_repo
            .create(&CreateUserInput {
                email: email.to_string(),
                first_name: admin.first_name.clone(),
                last_name: admin.last_name.clone(),
                password_hash: hash_password(password).context("Failed to hash password")?,
                is_superuser: true,
            })
            .await
            .context("Failed to create admin")?;

        tracing::info!(user_id = user.id, "Created superuser from configuration");
        Ok(Some(user))
    }

    /// Delete every expired token. Returns how many were removed.
    pub async fn cleanup_expired_tokens(&self) -> Result<u64, UserServiceError> {
        let removed = self
            .token_repo
            .delete_expired(Utc::now())
            .await
            .context("Failed to delete expired tokens")?;

        if removed > 0 {
            tracing::info!(removed, "Removed expired tokens");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxTokenRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    const PASSWORD: &str = "vivid-otter-42";

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    async fn setup() -> (UserService, Arc<dyn UserRepository>, Arc<dyn TokenRepository>) {
        let pool = migrated_pool().await;
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let token_repo = SqlxTokenRepository::boxed(pool);
        let service = UserService::new(user_repo.clone(), token_repo.clone());
        (service, user_repo, token_repo)
    }

    async fn user_count(pool: &DynDatabasePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap()
    }

    fn register_input(email: &str, first_name: &str) -> RegisterInput {
        RegisterInput {
            email: Some(email.to_string()),
            password: Some(PASSWORD.to_string()),
            first_name: Some(first_name.to_string()),
            last_name: Some("Lovelace".to_string()),
        }
    }

    fn login_input(username: &str, password: &str) -> LoginInput {
        LoginInput {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn field_errors(result: Result<(User, IssuedToken), UserServiceError>) -> FieldErrors {
        match result {
            Err(UserServiceError::Validation(errors)) => errors,
            other => panic!("Expected validation error, got {:?}", other.map(|(u, _)| u.id)),
        }
    }

    #[tokio::test]
    async fn test_register_creates_user_and_token() {
        let (service, _, _) = setup().await;

        let (user, token) = service
            .register(register_input("a@x.com", "Ada"))
            .await
            .expect("Registration should succeed");

        assert_eq!(user.username, "a@x.com");
        assert_eq!(user.email, "a@x.com");
        assert_ne!(user.password_hash, PASSWORD);
        assert!(verify_password(PASSWORD, &user.password_hash).unwrap());
        assert!(token.expiry.is_some());

        let owner = service.authenticate_token(&token.token).await.unwrap();
        assert_eq!(owner.map(|u| u.id), Some(user.id));
        assert_eq!(service.list_active_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let (service, _, _) = setup().await;
        service.register(register_input("a@x.com", "Ada")).await.unwrap();

        let errors = field_errors(service.register(register_input("A@x.com", "Bob")).await);
        assert_eq!(errors.get("email"), Some(&[NOT_UNIQUE.to_string()][..]));
        assert_eq!(service.list_active_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_non_alphabetic_name() {
        let (service, _, _) = setup().await;

        let errors = field_errors(service.register(register_input("a@x.com", "John3")).await);
        assert_eq!(
            errors.get("first_name"),
            Some(&["First name must be alphabetic".to_string()][..])
        );
        assert!(service.list_active_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_trims_names() {
        let (service, _, _) = setup().await;

        let (user, _) = service
            .register(RegisterInput {
                first_name: Some(" John ".to_string()),
                last_name: Some("\tSmith\n".to_string()),
                ..register_input("j@x.com", "unused")
            })
            .await
            .expect("Padded names should be accepted");

        assert_eq!(user.first_name, "John");
        assert_eq!(user.last_name, "Smith");

        let errors = field_errors(service.register(register_input("k@x.com", "   ")).await);
        assert_eq!(
            errors.get("first_name"),
            Some(&["First name is required".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_register_reports_every_field() {
        let (service, _, _) = setup().await;

        let errors = field_errors(
            service
                .register(RegisterInput {
                    email: Some("not-an-email".to_string()),
                    password: Some("123".to_string()),
                    first_name: None,
                    last_name: Some(String::new()),
                })
                .await,
        );

        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec!["email", "first_name", "last_name", "password"]
        );
        assert_eq!(
            errors.get("first_name"),
            Some(&["First name is required".to_string()][..])
        );
        assert!(errors.get("password").unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn test_register_missing_email_and_password() {
        let (service, _, _) = setup().await;

        let errors = field_errors(
            service
                .register(RegisterInput {
                    first_name: Some("Ada".to_string()),
                    last_name: Some("Lovelace".to_string()),
                    ..RegisterInput::default()
                })
                .await,
        );

        assert_eq!(errors.get("email"), Some(&[REQUIRED.to_string()][..]));
        assert_eq!(errors.get("password"), Some(&[REQUIRED.to_string()][..]));
    }

    #[tokio::test]
    async fn test_login_success_and_failures() {
        let (service, user_repo, _) = setup().await;
        let (user, _) = service.register(register_input("a@x.com", "Ada")).await.unwrap();

        let (logged_in, token) = service.login(login_input("a@x.com", PASSWORD)).await.unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(logged_in.last_login.is_some());
        assert!(service.authenticate_token(&token.token).await.unwrap().is_some());

        let stored = user_repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.last_login.is_some());

        for (username, password) in [("a@x.com", "wrong-password"), ("nobody@x.com", PASSWORD)] {
            match service.login(login_input(username, password)).await {
                Err(UserServiceError::Authentication(message)) => {
                    assert_eq!(message, INVALID_CREDENTIALS)
                }
                other => panic!("Expected authentication error, got {:?}", other.is_ok()),
            }
        }
    }

    #[tokio::test]
    async fn test_login_blank_fields() {
        let (service, _, _) = setup().await;

        match service.login(login_input("", "")).await {
            Err(UserServiceError::Validation(errors)) => {
                assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["password", "username"]);
            }
            other => panic!("Expected validation error, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn test_login_whitespace_username_is_blank() {
        let (service, _, _) = setup().await;
        service.register(register_input("a@x.com", "Ada")).await.unwrap();

        match service.login(login_input("   ", PASSWORD)).await {
            Err(UserServiceError::Validation(errors)) => {
                assert_eq!(errors.get("username"), Some(&[BLANK.to_string()][..]));
            }
            other => panic!("Expected validation error, got {:?}", other.is_ok()),
        }

        let (user, _) = service.login(login_input(" a@x.com ", PASSWORD)).await.unwrap();
        assert_eq!(user.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_login_or_authenticate() {
        let pool = migrated_pool().await;
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxTokenRepository::boxed(pool.clone()),
        );
        let (user, token) = service.register(register_input("a@x.com", "Ada")).await.unwrap();

        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(user.id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();

        assert!(matches!(
            service.login(login_input("a@x.com", PASSWORD)).await,
            Err(UserServiceError::Authentication(_))
        ));
        assert!(service.authenticate_token(&token.token).await.unwrap().is_none());
        assert!(service.list_active_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logout_revokes_only_presented_token() {
        let (service, _, _) = setup().await;
        let (_, first) = service.register(register_input("a@x.com", "Ada")).await.unwrap();
        let (_, second) = service.login(login_input("a@x.com", PASSWORD)).await.unwrap();

        assert!(service.logout(&first.token).await.unwrap());
        assert!(!service.logout(&first.token).await.unwrap());

        assert!(service.authenticate_token(&first.token).await.unwrap().is_none());
        assert!(service.authenticate_token(&second.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_logout_all_revokes_every_token() {
        let (service, _, _) = setup().await;
        let (ada, first) = service.register(register_input("a@x.com", "Ada")).await.unwrap();
        let (_, second) = service.login(login_input("a@x.com", PASSWORD)).await.unwrap();
        let (_, other) = service.register(register_input("b@x.com", "Bob")).await.unwrap();

        assert_eq!(service.logout_all(ada.id).await.unwrap(), 2);

        assert!(service.authenticate_token(&first.token).await.unwrap().is_none());
        assert!(service.authenticate_token(&second.token).await.unwrap().is_none());
        assert!(service.authenticate_token(&other.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_token_rejected_and_deleted() {
        let (service, _, token_repo) = setup().await;
        let (user, _) = service.register(register_input("a@x.com", "Ada")).await.unwrap();

        let plaintext = generate_token();
        let digest = digest_token(&plaintext);
        token_repo
            .create(&AuthToken {
                digest: digest.clone(),
                token_key: token_key(&plaintext).to_string(),
                user_id: user.id,
                created: Utc::now() - Duration::hours(11),
                expiry: Some(Utc::now() - Duration::hours(1)),
            })
            .await
            .unwrap();

        assert!(service.authenticate_token(&plaintext).await.unwrap().is_none());
        assert!(token_repo.get_by_digest(&digest).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired_tokens() {
        let (service, _, token_repo) = setup().await;
        let (user, live) = service.register(register_input("a@x.com", "Ada")).await.unwrap();

        token_repo
            .create(&AuthToken {
                digest: "stale".to_string(),
                token_key: "stale".to_string(),
                user_id: user.id,
                created: Utc::now() - Duration::hours(20),
                expiry: Some(Utc::now() - Duration::hours(10)),
            })
            .await
            .unwrap();

        assert_eq!(service.cleanup_expired_tokens().await.unwrap(), 1);
        assert!(service.authenticate_token(&live.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_token_rejected() {
        let (service, _, _) = setup().await;
        assert!(service.authenticate_token("").await.unwrap().is_none());
        assert!(service.authenticate_token("not-a-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_superuser() {
        let pool = migrated_pool().await;
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxTokenRepository::boxed(pool.clone()),
        );

        assert!(service.ensure_superuser(&AdminConfig::default()).await.unwrap().is_none());

        let admin = AdminConfig {
            email: Some("admin@x.com".to_string()),
            password: Some("admin-secret-pass".to_string()),
            ..AdminConfig::default()
        };

        let created = service.ensure_superuser(&admin).await.unwrap().unwrap();
        assert!(created.is_superuser);
        assert_eq!(created.first_name, "Admin");

        let again = service.ensure_superuser(&admin).await.unwrap().unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(user_count(&pool).await, 1);

        let (login_user, _) = service
            .login(login_input("admin@x.com", "admin-secret-pass"))
            .await
            .unwrap();
        assert!(login_user.is_superuser);
    }

    #[tokio::test]
    async fn test_ensure_superuser_promotes_existing_account() {
        let (service, _, _) = setup().await;
        let (user, _) = service.register(register_input("a@x.com", "Ada")).await.unwrap();
        assert!(!user.is_superuser);

        let admin = AdminConfig {
            email: Some("a@x.com".to_string()),
            password: Some("ignored-password".to_string()),
            ..AdminConfig::default()
        };

        let promoted = service.ensure_superuser(&admin).await.unwrap().unwrap();
        assert_eq!(promoted.id, user.id);
        assert!(promoted.is_superuser);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_fails_without_panicking() {
        for ttl in [3_000_000_000, i64::MAX] {
            let pool = migrated_pool().await;
            let service = UserService::with_config(
                SqlxUserRepository::boxed(pool.clone()),
                SqlxTokenRepository::boxed(pool.clone()),
                &AuthConfig {
                    token_ttl_hours: ttl,
                    ..AuthConfig::default()
                },
            );

            let result = service.register(register_input("a@x.com", "Ada")).await;
            assert!(matches!(result, Err(UserServiceError::Internal(_))));
        }
    }
}
