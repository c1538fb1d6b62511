//! Connection pools for the supported backends
//!
//! [`create_pool`] opens the backend named in the configuration. Repositories
//! hold the result as a [`DynDatabasePool`], match on its driver and borrow
//! the concrete sqlx pool for that backend.

use anyhow::{Context, Result};
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_MAX_CONNECTIONS: u32 = 20;
const MYSQL_MAX_CONNECTIONS: u32 = 30;

/// Access to the pool behind a configured backend
pub trait DatabasePool: Send + Sync {
    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;

    /// Borrow the SQLite pool, failing if the driver is something else
    fn sqlite(&self) -> Result<&SqlitePool> {
        self.as_sqlite()
            .context("Database pool is not backed by SQLite")
    }

    /// Borrow the MySQL pool, failing if the driver is something else
    fn mysql(&self) -> Result<&MySqlPool> {
        self.as_mysql()
            .context("Database pool is not backed by MySQL")
    }
}

/// An open pool for one of the supported backends
pub enum Database {
    Sqlite(SqlitePool),
    Mysql(MySqlPool),
}

impl DatabasePool for Database {
    fn driver(&self) -> DatabaseDriver {
        match self {
            Self::Sqlite(_) => DatabaseDriver::Sqlite,
            Self::Mysql(_) => DatabaseDriver::Mysql,
        }
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            Self::Sqlite(pool) => Some(pool),
            Self::Mysql(_) => None,
        }
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            Self::Mysql(pool) => Some(pool),
            Self::Sqlite(_) => None,
        }
    }
}

/// Shared handle to the configured database
pub type DynDatabasePool = Arc<dyn DatabasePool>;

fn is_in_memory(url: &str) -> bool {
    url == ":memory:" || url.starts_with("sqlite::memory:")
}

/// Open a SQLite pool with foreign key enforcement on every connection.
///
/// `url` is a bare file path, a `sqlite:` URL, or `:memory:`. Missing parent
/// directories of a file database are created.
async fn connect_sqlite(url: &str) -> Result<SqlitePool> {
    if is_in_memory(url) {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // Each new connection would open an empty database, so the single
        // connection is never closed for idling or age.
        return SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database");
    }

    let options = if url.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
    } else {
        SqliteConnectOptions::new().filename(url)
    };

    if let Some(parent) = options.clone().get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }

    SqlitePoolOptions::new()
        .max_connections(SQLITE_MAX_CONNECTIONS)
        .connect_with(options.create_if_missing(true).foreign_keys(true))
        .await
        .with_context(|| format!("Failed to connect to SQLite database: {url}"))
}

async fn connect_mysql(url: &str) -> Result<MySqlPool> {
    let url = if url.starts_with("mysql://") {
        url.to_string()
    } else {
        format!("mysql://{url}")
    };
    let options = MySqlConnectOptions::from_str(&url).context("Invalid MySQL URL")?;

    MySqlPoolOptions::new()
        .max_connections(MYSQL_MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .context("Failed to connect to MySQL database")
}

/// Create a database connection pool based on configuration.
///
/// # Errors
///
/// Returns an error if the URL is malformed or the connection cannot be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let database = match config.driver {
        DatabaseDriver::Sqlite => Database::Sqlite(connect_sqlite(&config.url).await?),
        DatabaseDriver::Mysql => Database::Mysql(connect_mysql(&config.url).await?),
    };
    tracing::debug!(driver = ?config.driver, "Database pool opened");
    Ok(Arc::new(database))
}

/// Create a SQLite in-memory database pool for testing
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    create_pool(&DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    })
    .await
}
