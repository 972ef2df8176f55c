//! # Core Storage
//!
//! Durable local state for the capture sync core. One SQLite database holds
//! two logical stores:
//!
//! - `blobs`: raw session video keyed by blob key ([`SqliteBlobStore`])
//! - `sync_tasks`: the upload queue, read and written by `core-sync`
//!
//! The schema is versioned with `PRAGMA user_version`. The local database is a
//! cache of work not yet uploaded, so an incompatible version is wiped and
//! recreated instead of failing startup.

pub mod blob_store;
pub mod db;
pub mod error;

pub use blob_store::SqliteBlobStore;
pub use db::{
    create_pool, create_test_pool, health_check, schema_version, DatabaseConfig, SCHEMA_VERSION,
};
pub use error::{Result, StorageError};
