//! The [`SnapshotStorage`] seam between the store and durable storage.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::repositories::SnapshotRepo;
use crate::DbPool;

/// Errors from a snapshot storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A single-key blob slot shared by every view of one session.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Read the last persisted blob, `None` if nothing was ever saved.
    async fn load(&self) -> Result<Option<String>, StorageError>;

    /// Replace the persisted blob.
    async fn save(&self, payload: &str) -> Result<(), StorageError>;

    /// Drop the persisted blob entirely.
    async fn clear(&self) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Snapshot slot stored as one row of the `task_snapshots` table.
pub struct SqliteSnapshotStorage {
    pool: DbPool,
    key: String,
}

impl SqliteSnapshotStorage {
    /// Wrap an existing pool. Call [`crate::ensure_schema`] first.
    pub fn new(pool: DbPool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }

    /// Open the database at `database_url`, create the schema and bind to `key`.
    pub async fn connect(database_url: &str, key: impl Into<String>) -> Result<Self, StorageError> {
        let pool = crate::create_pool(database_url).await?;
        crate::health_check(&pool).await?;
        crate::ensure_schema(&pool).await?;
        Ok(Self::new(pool, key))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl SnapshotStorage for SqliteSnapshotStorage {
    async fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(SnapshotRepo::find(&self.pool, &self.key).await?)
    }

    async fn save(&self, payload: &str) -> Result<(), StorageError> {
        SnapshotRepo::upsert(&self.pool, &self.key, payload).await?;
        tracing::debug!(key = %self.key, bytes = payload.len(), "Snapshot saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let deleted = SnapshotRepo::delete(&self.pool, &self.key).await?;
        tracing::debug!(key = %self.key, deleted, "Snapshot cleared");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local snapshot slot, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySnapshotStorage {
    payload: RwLock<Option<String>>,
    writes: AtomicUsize,
}

impl MemorySnapshotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStorage for MemorySnapshotStorage {
    async fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.payload.read().await.clone())
    }

    async fn save(&self, payload: &str) -> Result<(), StorageError> {
        *self.payload.write().await = Some(payload.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.payload.write().await = None;
        Ok(())
    }
}
