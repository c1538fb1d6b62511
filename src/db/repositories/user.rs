//! User repository
//!
//! Database operations for user accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateUserInput, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password_hash, \
                            is_active, is_superuser, date_joined, last_login";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; the username is set to the email
    async fn create(&self, input: &CreateUserInput) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Check whether an email is already registered
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// All active users, oldest account first
    async fn list_active(&self) -> Result<Vec<User>>;

    async fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn set_superuser(&self, id: i64, is_superuser: bool) -> Result<()>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, input: &CreateUserInput) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_email_sqlite(self.pool.sqlite()?, email).await,
            DatabaseDriver::Mysql => get_user_by_email_mysql(self.pool.mysql()?, email).await,
        }
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE LOWER(email) = LOWER(?)")
                    .bind(email)
                    .fetch_one(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE LOWER(email) = LOWER(?)")
                    .bind(email)
                    .fetch_one(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to check email")?;

        Ok(count > 0)
    }

    async fn list_active(&self) -> Result<Vec<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_active_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_active_users_mysql(self.pool.mysql()?).await,
        }
    }

    async fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let sql = "UPDATE users SET last_login = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|_| ())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to update last login")
    }

    async fn set_superuser(&self, id: i64, is_superuser: bool) -> Result<()> {
        let sql = "UPDATE users SET is_superuser = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(is_superuser)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|_| ())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(is_superuser)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to update superuser flag")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, input: &CreateUserInput) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, first_name, last_name, password_hash,
                           is_active, is_superuser, date_joined)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.email)
    .bind(&input.email)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.password_hash)
    .bind(true)
    .bind(input.is_superuser)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(created_user(result.last_insert_rowid(), input, now))
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    Ok(row.as_ref().map(row_to_user_sqlite))
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE LOWER(email) = LOWER(?)",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    Ok(row.as_ref().map(row_to_user_sqlite))
}

async fn list_active_users_sqlite(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE is_active = ? ORDER BY id",
        USER_COLUMNS
    ))
    .bind(true)
    .fetch_all(pool)
    .await
    .context("Failed to list active users")?;

    Ok(rows.iter().map(row_to_user_sqlite).collect())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        is_superuser: row.get("is_superuser"),
        date_joined: row.get("date_joined"),
        last_login: row.get("last_login"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, input: &CreateUserInput) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, first_name, last_name, password_hash,
                           is_active, is_superuser, date_joined)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.email)
    .bind(&input.email)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.password_hash)
    .bind(true)
    .bind(input.is_superuser)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(created_user(result.last_insert_id() as i64, input, now))
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    Ok(row.as_ref().map(row_to_user_mysql))
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE LOWER(email) = LOWER(?)",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    Ok(row.as_ref().map(row_to_user_mysql))
}

async fn list_active_users_mysql(pool: &MySqlPool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE is_active = ? ORDER BY id",
        USER_COLUMNS
    ))
    .bind(true)
    .fetch_all(pool)
    .await
    .context("Failed to list active users")?;

    Ok(rows.iter().map(row_to_user_mysql).collect())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        is_superuser: row.get("is_superuser"),
        date_joined: row.get("date_joined"),
        last_login: row.get("last_login"),
    }
}

fn created_user(id: i64, input: &CreateUserInput, now: DateTime<Utc>) -> User {
    User {
        id,
        username: input.email.clone(),
        email: input.email.clone(),
        first_name: input.first_name.clone(),
        last_name: input.last_name.clone(),
        password_hash: input.password_hash.clone(),
        is_active: true,
        is_superuser: input.is_superuser,
        date_joined: now,
        last_login: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn input(email: &str) -> CreateUserInput {
        CreateUserInput {
            email: email.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password_hash: "hash".to_string(),
            is_superuser: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo.create(&input("ada@example.com")).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.username, "ada@example.com");

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "ada@example.com");
        assert_eq!(fetched.username, fetched.email);
        assert_eq!(fetched.first_name, "Ada");
        assert!(fetched.is_active);
        assert!(!fetched.is_superuser);
        assert!(fetched.last_login.is_none());

        assert!(repo.get_by_id(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_email_is_case_insensitive() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&input("ada@example.com")).await.unwrap();

        assert!(repo.get_by_email("ADA@example.com").await.unwrap().is_some());
        assert!(repo.email_exists("Ada@Example.com").await.unwrap());
        assert!(!repo.email_exists("bob@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (pool, repo) = setup_test_repo().await;
        repo.create(&input("ada@example.com")).await.unwrap();

        assert!(repo.create(&input("ada@example.com")).await.is_err());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_list_active_excludes_inactive() {
        let (pool, repo) = setup_test_repo().await;
        let ada = repo.create(&input("ada@example.com")).await.unwrap();
        let bob = repo.create(&input("bob@example.com")).await.unwrap();

        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(bob.id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, ada.id);
    }

    #[tokio::test]
    async fn test_update_flags_and_last_login() {
        let (_pool, repo) = setup_test_repo().await;
        let ada = repo.create(&input("ada@example.com")).await.unwrap();

        let now = Utc::now();
        repo.update_last_login(ada.id, now).await.unwrap();
        repo.set_superuser(ada.id, true).await.unwrap();

        let fetched = repo.get_by_id(ada.id).await.unwrap().unwrap();
        assert!(fetched.is_superuser);
        let last_login = fetched.last_login.unwrap();
        assert!((last_login - now).num_seconds().abs() < 1);
    }
}
