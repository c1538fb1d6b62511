//! Authentication token repository
//!
//! Stores token digests only. Rows are keyed by digest, so revoking a token
//! is a single-row delete and concurrent logouts cannot interfere.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::AuthToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Token repository trait
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn create(&self, token: &AuthToken) -> Result<AuthToken>;

    /// Look up a token by its digest
    async fn get_by_digest(&self, digest: &str) -> Result<Option<AuthToken>>;

    /// All tokens sharing a lookup key
    async fn list_by_key(&self, token_key: &str) -> Result<Vec<AuthToken>>;

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<AuthToken>>;

    /// Delete one token, returning whether it existed
    async fn delete(&self, digest: &str) -> Result<bool>;

    /// Delete every token owned by a user, returning how many were removed
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete tokens whose expiry is before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based token repository implementation
pub struct SqlxTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxTokenRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TokenRepository for SqlxTokenRepository {
    async fn create(&self, token: &AuthToken) -> Result<AuthToken> {
        let sql = r#"
            INSERT INTO auth_tokens (digest, token_key, user_id, created, expiry)
            VALUES (?, ?, ?, ?, ?)
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&token.digest)
                    .bind(&token.token_key)
                    .bind(token.user_id)
                    .bind(token.created)
                    .bind(token.expiry)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|_| ())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&token.digest)
                    .bind(&token.token_key)
                    .bind(token.user_id)
                    .bind(token.created)
                    .bind(token.expiry)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to create token")?;

        Ok(token.clone())
    }

    async fn get_by_digest(&self, digest: &str) -> Result<Option<AuthToken>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_token_by_digest_sqlite(self.pool.sqlite()?, digest).await,
            DatabaseDriver::Mysql => get_token_by_digest_mysql(self.pool.mysql()?, digest).await,
        }
    }

    async fn list_by_key(&self, token_key: &str) -> Result<Vec<AuthToken>> {
        let sql = "SELECT digest, token_key, user_id, created, expiry FROM auth_tokens WHERE token_key = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(token_key)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list tokens by key")?;
                Ok(rows.iter().map(row_to_token_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(token_key)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list tokens by key")?;
                Ok(rows.iter().map(row_to_token_mysql).collect())
            }
        }
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<AuthToken>> {
        let sql = "SELECT digest, token_key, user_id, created, expiry FROM auth_tokens \
                   WHERE user_id = ? ORDER BY created";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(user_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list tokens by user")?;
                Ok(rows.iter().map(row_to_token_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(user_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list tokens by user")?;
                Ok(rows.iter().map(row_to_token_mysql).collect())
            }
        }
    }

    async fn delete(&self, digest: &str) -> Result<bool> {
        let sql = "DELETE FROM auth_tokens WHERE digest = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(digest)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(digest)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete token")?;

        Ok(affected > 0)
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let sql = "DELETE FROM auth_tokens WHERE user_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete tokens by user")
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let sql = "DELETE FROM auth_tokens WHERE expiry IS NOT NULL AND expiry < ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete expired tokens")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_token_by_digest_sqlite(pool: &SqlitePool, digest: &str) -> Result<Option<AuthToken>> {
    let row = sqlx::query(
        "SELECT digest, token_key, user_id, created, expiry FROM auth_tokens WHERE digest = ?",
    )
    .bind(digest)
    .fetch_optional(pool)
    .await
    .context("Failed to get token")?;

    Ok(row.as_ref().map(row_to_token_sqlite))
}

fn row_to_token_sqlite(row: &sqlx::sqlite::SqliteRow) -> AuthToken {
    AuthToken {
        digest: row.get("digest"),
        token_key: row.get("token_key"),
        user_id: row.get("user_id"),
        created: row.get("created"),
        expiry: row.get("expiry"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_token_by_digest_mysql(pool: &MySqlPool, digest: &str) -> Result<Option<AuthToken>> {
    let row = sqlx::query(
        "SELECT digest, token_key, user_id, created, expiry FROM auth_tokens WHERE digest = ?",
    )
    .bind(digest)
    .fetch_optional(pool)
    .await
    .context("Failed to get token")?;

    Ok(row.as_ref().map(row_to_token_mysql))
}

fn row_to_token_mysql(row: &sqlx::mysql::MySqlRow) -> AuthToken {
    AuthToken {
        digest: row.get("digest"),
        token_key: row.get("token_key"),
        user_id: row.get("user_id"),
        created: row.get("created"),
        expiry: row.get("expiry"),
    }
}
