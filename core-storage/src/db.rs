//! # Database Connection Pool
//!
//! SQLite pool setup and schema versioning for the local sync store.
//!
//! ## Features
//!
//! - **WAL Mode**: a writer and readers can proceed together
//! - **Schema Versioning**: `PRAGMA user_version` tracks the layout
//! - **Wipe on Mismatch**: an incompatible store is dropped and recreated
//! - **Health Checks**: connection validation after setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_storage::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("/data/capture/sync.db")).await?;
//! ```
//!
//! ## Testing
//!
//! ```rust,ignore
//! let pool = create_test_pool().await?;
//! ```

use crate::{Result, StorageError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Layout version written to `PRAGMA user_version`.
///
/// Bump whenever a table in [`SCHEMA`] changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS blobs (
        key TEXT PRIMARY KEY NOT NULL,
        data BLOB NOT NULL,
        size_bytes INTEGER NOT NULL,
        stored_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_tasks (
        id TEXT PRIMARY KEY NOT NULL,
        session_id TEXT NOT NULL UNIQUE,
        task_type TEXT NOT NULL,
        status TEXT NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        last_attempt INTEGER,
        next_eligible_at INTEGER,
        remote_path TEXT NOT NULL,
        blob_key TEXT NOT NULL,
        content_type TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sync_tasks_status ON sync_tasks(status)",
];

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:` URL of the database file, or `sqlite::memory:`
    pub database_url: String,

    pub min_connections: u32,

    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    pub idle_timeout: Option<Duration>,

    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    /// Configuration for a database file. `:memory:` yields [`DatabaseConfig::in_memory`].
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        if path.as_os_str() == ":memory:" {
            return Self::in_memory();
        }

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            statement_cache_capacity: 100,
        }
    }

    /// In-memory database. Every SQLite connection to `:memory:` opens a
    /// separate database, so the pool is pinned to a single connection.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
            statement_cache_capacity: 100,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.ends_with(":memory:")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured SQLite pool with the current schema applied.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, the schema cannot be
/// (re)created, or the health check fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Opening sync store"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .statement_cache_capacity(config.statement_cache_capacity);

    let mut pool_options = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);

    if config.is_in_memory() {
        // Dropping the last connection would discard the database.
        pool_options = pool_options.max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            StorageError::Database(e)
        })?;

    ensure_schema(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// In-memory pool with the schema applied.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

/// Current `PRAGMA user_version` of the database.
pub async fn schema_version(pool: &Pool<Sqlite>) -> Result<i64> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

/// Bring the store to [`SCHEMA_VERSION`].
///
/// A matching version only re-runs the idempotent `CREATE ... IF NOT EXISTS`
/// statements. Any other version drops every user table first.
async fn ensure_schema(pool: &Pool<Sqlite>) -> Result<()> {
    let found = schema_version(pool).await?;
    let mut tx = pool.begin().await?;

    if found != SCHEMA_VERSION {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *tx)
        .await?;

        if !tables.is_empty() {
            warn!(
                found,
                expected = SCHEMA_VERSION,
                tables = tables.len(),
                "Incompatible sync store schema, wiping local cache"
            );
        }

        for table in tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table.replace('"', "\"\"")))
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Migration(format!("drop {table}: {e}")))?;
        }
    }

    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
    }

    // PRAGMA does not take bound parameters.
    sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    tx.commit().await?;

    debug!(version = SCHEMA_VERSION, "Sync store schema ready");
    Ok(())
}

/// Run `SELECT 1` against the pool.
pub async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        StorageError::Database(e)
    })?;
    Ok(())
}
