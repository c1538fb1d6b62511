//! Blog post repository
//!
//! Database operations for blog posts.
//!
//! This module provides:
//! - `BlogRepository` trait defining the interface for post data access
//! - `SqlxBlogRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{BlogPost, CreateBlogInput, UpdateBlogInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const POST_COLUMNS: &str = "id, author_id, title, content, created, updated";

/// Blog repository trait
#[async_trait]
pub trait BlogRepository: Send + Sync {
    /// Insert a post owned by `author_id`
    async fn create(&self, author_id: i64, input: &CreateBlogInput) -> Result<BlogPost>;

    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>>;

    /// Posts newest first, optionally filtered by a case-insensitive
    /// substring of title or content
    async fn list(&self, search: Option<&str>) -> Result<Vec<BlogPost>>;

    /// Apply the supplied changes and refresh `updated`.
    /// Returns `None` if the post does not exist.
    async fn update(&self, id: i64, input: &UpdateBlogInput) -> Result<Option<BlogPost>>;

    /// Delete a post, returning whether it existed
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based blog repository implementation
pub struct SqlxBlogRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn create(&self, author_id: i64, input: &CreateBlogInput) -> Result<BlogPost> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_post_sqlite(self.pool.sqlite()?, author_id, input).await,
            DatabaseDriver::Mysql => create_post_mysql(self.pool.mysql()?, author_id, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_post_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_post_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self, search: Option<&str>) -> Result<Vec<BlogPost>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_posts_sqlite(self.pool.sqlite()?, search).await,
            DatabaseDriver::Mysql => list_posts_mysql(self.pool.mysql()?, search).await,
        }
    }

    async fn update(&self, id: i64, input: &UpdateBlogInput) -> Result<Option<BlogPost>> {
        let now = Utc::now();
        let sql = r#"
            UPDATE blog_posts
            SET title = COALESCE(?, title), content = COALESCE(?, content), updated = ?
            WHERE id = ?
        "#;

        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&input.title)
                .bind(&input.content)
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&input.title)
                .bind(&input.content)
                .bind(now)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update blog post")?;

        // MySQL counts only changed rows, so existence is read back instead.
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM blog_posts WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete blog post")?;

        Ok(affected > 0)
    }
}

/// Build a LIKE pattern matching `term` anywhere, with `!` as the escape
/// character so `%` and `_` in the term match literally.
///
/// Case folding is ASCII-only to agree with SQLite's `LOWER()`, which leaves
/// non-ASCII letters untouched.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_ascii_lowercase().chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

const LIST_SQL: &str = "SELECT id, author_id, title, content, created, updated FROM blog_posts \
                        ORDER BY created DESC, id DESC";

const SEARCH_SQL: &str = "SELECT id, author_id, title, content, created, updated FROM blog_posts \
                          WHERE LOWER(title) LIKE ? ESCAPE '!' OR LOWER(content) LIKE ? ESCAPE '!' \
                          ORDER BY created DESC, id DESC";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(
    pool: &SqlitePool,
    author_id: i64,
    input: &CreateBlogInput,
) -> Result<BlogPost> {
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO blog_posts (author_id, title, content, created, updated) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(author_id)
    .bind(&input.title)
    .bind(&input.content)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create blog post")?;

    Ok(BlogPost {
        id: result.last_insert_rowid(),
        author_id,
        title: input.title.clone(),
        content: input.content.clone(),
        created: now,
        updated: now,
    })
}

async fn get_post_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<BlogPost>> {
    let row = sqlx::query(&format!("SELECT {} FROM blog_posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get blog post")?;

    Ok(row.as_ref().map(row_to_post_sqlite))
}

async fn list_posts_sqlite(pool: &SqlitePool, search: Option<&str>) -> Result<Vec<BlogPost>> {
    let pattern = search.map(like_pattern);
    let rows = match &pattern {
        Some(pattern) => {
            sqlx::query(SEARCH_SQL)
                .bind(pattern)
                .bind(pattern)
                .fetch_all(pool)
                .await
        }
        None => sqlx::query(LIST_SQL).fetch_all(pool).await,
    }
    .context("Failed to list blog posts")?;

    Ok(rows.iter().map(row_to_post_sqlite).collect())
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> BlogPost {
    BlogPost {
        id: row.get("id"),
        author_id: row.get("author_id"),
        title: row.get("title"),
        content: row.get("content"),
        created: row.get("created"),
        updated: row.get("updated"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(
    pool: &MySqlPool,
    author_id: i64,
    input: &CreateBlogInput,
) -> Result<BlogPost> {
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO blog_posts (author_id, title, content, created, updated) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(author_id)
    .bind(&input.title)
    .bind(&input.content)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create blog post")?;

    Ok(BlogPost {
        id: result.last_insert_id() as i64,
        author_id,
        title: input.title.clone(),
        content: input.content.clone(),
        created: now,
        updated: now,
    })
}

async fn get_post_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<BlogPost>> {
    let row = sqlx::query(&format!("SELECT {} FROM blog_posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get blog post")?;

    Ok(row.as_ref().map(row_to_post_mysql))
}

async fn list_posts_mysql(pool: &MySqlPool, search: Option<&str>) -> Result<Vec<BlogPost>> {
    let pattern = search.map(like_pattern);
    let rows = match &pattern {
        Some(pattern) => {
            sqlx::query(SEARCH_SQL)
                .bind(pattern)
                .bind(pattern)
                .fetch_all(pool)
                .await
        }
        None => sqlx::query(LIST_SQL).fetch_all(pool).await,
    }
    .context("Failed to list blog posts")?;

    Ok(rows.iter().map(row_to_post_mysql).collect())
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> BlogPost {
    BlogPost {
        id: row.get("id"),
        author_id: row.get("author_id"),
        title: row.get("title"),
        content: row.get("content"),
        created: row.get("created"),
        updated: row.get("updated"),
    }
}
