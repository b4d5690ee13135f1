//! Durable storage for the client-side task snapshot.
//!
//! The store persists its whole state as one versioned blob under a single
//! key. This crate only moves that blob in and out of storage; it never
//! parses it.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub mod repositories;
pub mod storage;

pub use storage::{MemorySnapshotStorage, SnapshotStorage, SqliteSnapshotStorage, StorageError};

pub type DbPool = sqlx::SqlitePool;

/// Snapshot writes are already serialized by the store, and a single
/// connection keeps `sqlite::memory:` databases shared across queries.
const MAX_CONNECTIONS: u32 = 1;

/// Create a connection pool from a database URL, creating the file if needed.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
}

/// Create the snapshot table if it does not exist yet.
pub async fn ensure_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS task_snapshots ( \
             key TEXT PRIMARY KEY NOT NULL, \
             payload TEXT NOT NULL, \
             updated_at TEXT NOT NULL \
         )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Simple connectivity check.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
