use gentrack_client::ApiError;
use gentrack_core::error::CoreError;
use gentrack_db::StorageError;
use gentrack_store::StoreError;

/// Errors surfaced by [`Session`](crate::Session) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The request was rejected before any network call.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("Backend request failed: {0}")]
    Api(#[from] ApiError),

    #[error("Task store error: {0}")]
    Store(#[from] StoreError),

    #[error("Snapshot storage error: {0}")]
    Storage(#[from] StorageError),
}
