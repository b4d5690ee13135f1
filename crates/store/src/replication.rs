//! Cross-view replication.
//!
//! Each view listens on the session bus. When another view announces a
//! persisted snapshot, this view reloads the durable copy and replaces its
//! own state. Reloading never republishes, so views do not ping-pong.

use std::sync::Arc;

use gentrack_events::StoreEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::TaskStore;

/// Subscribe `store` to the bus and spawn its replication listener.
///
/// The subscription is taken before the task is spawned so no
/// announcement published after this call returns can be missed.
pub fn spawn(store: &Arc<TaskStore>, cancel: CancellationToken) -> JoinHandle<()> {
    let receiver = store.subscribe();
    tokio::spawn(run(Arc::clone(store), receiver, cancel))
}

/// Replication loop. Runs until cancelled or the bus is dropped.
pub async fn run(
    store: Arc<TaskStore>,
    mut receiver: broadcast::Receiver<StoreEvent>,
    cancel: CancellationToken,
) {
    let view_id = store.view_id();
    tracing::debug!(%view_id, "Replication listener started");

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = receiver.recv() => event,
        };

        match event {
            Ok(event) if event.origin() == view_id => {}
            Ok(StoreEvent::SnapshotPersisted { origin }) => {
                if let Err(e) = store.reload().await {
                    tracing::error!(%view_id, %origin, error = %e, "Failed to reload replicated snapshot");
                }
            }
            Ok(StoreEvent::TaskSettled { .. }) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(%view_id, skipped, "Replication listener lagged, reloading");
                if let Err(e) = store.reload().await {
                    tracing::error!(%view_id, error = %e, "Failed to reload after lag");
                }
            }
            Err(RecvError::Closed) => break,
        }
    }

    tracing::debug!(%view_id, "Replication listener stopped");
}
