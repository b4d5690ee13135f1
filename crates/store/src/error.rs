use gentrack_core::error::CoreError;
use gentrack_db::StorageError;

/// Errors returned by [`TaskStore`](crate::TaskStore) operations.
///
/// Stale or redundant updates are not errors; they come back as
/// [`ApplyOutcome::Discarded`](crate::ApplyOutcome::Discarded).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
