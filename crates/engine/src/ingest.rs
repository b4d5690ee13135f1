//! Ingest sources that feed the store outside of polling: user
//! submissions and push updates.

use std::sync::Arc;

use gentrack_client::GenerationApi;
use gentrack_core::reconcile::TaskUpdate;
use gentrack_core::submission::SubmitRequest;
use gentrack_core::types::JobId;
use gentrack_store::{ApplyOutcome, TaskStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;

/// Validate, submit and start tracking a generation job.
///
/// Invalid requests fail before any network call. The task is created
/// with whatever status the backend returned, which may already be past
/// `PENDING` when the backend reused an existing job.
pub async fn submit(
    store: &TaskStore,
    api: &GenerationApi,
    request: &SubmitRequest,
) -> Result<JobId, SessionError> {
    request.validate()?;

    let response = api.submit(request).await?;
    tracing::info!(
        job_id = %response.job_id,
        mode = %request.mode,
        status = %response.status,
        "Generation job submitted",
    );

    store
        .create(response.job_id.clone(), request.mode, response.status)
        .await?;
    Ok(response.job_id)
}

/// Apply push updates to the store until cancelled or the sender is gone.
pub async fn run_push_consumer(
    store: Arc<TaskStore>,
    mut updates: mpsc::Receiver<TaskUpdate>,
    cancel: CancellationToken,
) {
    loop {
        let update = tokio::select! {
            _ = cancel.cancelled() => break,
            update = updates.recv() => update,
        };
        let Some(update) = update else {
            break;
        };

        match store.apply_update(&update).await {
            Ok(ApplyOutcome::Applied { settled: true }) => {
                tracing::debug!(job_id = %update.id, status = %update.status, "Push update settled task");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(job_id = %update.id, error = %e, "Failed to apply push update");
            }
        }
    }
    tracing::debug!("Push consumer stopped");
}
