//! End-to-end session tests against the fake backend.

#[macro_use]
mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use gentrack_core::clock::SystemClock;
use gentrack_core::error::CoreError;
use gentrack_core::submission::SubmitRequest;
use gentrack_core::task::{GenerationMode, TaskStatus};
use gentrack_db::MemorySnapshotStorage;
use gentrack_engine::{Session, SessionError};

use common::Backend;

async fn start(backend: &Arc<Backend>, storage: Arc<MemorySnapshotStorage>) -> Session {
    let base = common::spawn(backend.clone()).await;
    Session::start(common::test_config(base), storage, Arc::new(SystemClock))
        .await
        .unwrap()
}

async fn status_of(session: &Session, id: &str) -> Option<TaskStatus> {
    session.store().get(id).await.map(|t| t.status)
}

#[tokio::test]
async fn submit_tracks_the_returned_job() {
    let backend = Arc::new(Backend::default());
    let session = start(&backend, Arc::new(MemorySnapshotStorage::new())).await;

    let job_id = session
        .submit(&SubmitRequest::new("a lighthouse at dusk", GenerationMode::TextToVideo))
        .await
        .unwrap();

    let task = session.store().get(&job_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.mode, GenerationMode::TextToVideo);
    assert!(task.is_read);
    assert_eq!(session.store().unread_count().await, 0);

    session.shutdown().await;
}

#[tokio::test]
async fn invalid_submission_never_reaches_the_backend() {
    let backend = Arc::new(Backend::default());
    let session = start(&backend, Arc::new(MemorySnapshotStorage::new())).await;

    let err = session
        .submit(&SubmitRequest::new("animate this", GenerationMode::ImageToVideo))
        .await
        .unwrap_err();
    assert_matches!(err, SessionError::Invalid(CoreError::Validation(_)));

    let err = session
        .submit(&SubmitRequest::new("", GenerationMode::TextToImage))
        .await
        .unwrap_err();
    assert_matches!(err, SessionError::Invalid(_));

    assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 0);
    assert!(session.store().snapshot().await.tasks.is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn hydration_poll_reconciles_persisted_tasks() {
    let backend = Arc::new(Backend::default());
    backend.set_job("job-a", "COMPLETED");
    let storage = Arc::new(MemorySnapshotStorage::new());
    common::seed(&storage, &["job-a", "job-b"]).await;

    let session = start(&backend, storage).await;

    assert!(eventually!(
        status_of(&session, "job-a").await == Some(TaskStatus::Completed)
            && status_of(&session, "job-b").await == Some(TaskStatus::Failed)
    ));
    let a = session.store().get("job-a").await.unwrap();
    assert_eq!(a.result_url.as_deref(), Some("/static/job-a.png"));
    let b = session.store().get("job-b").await.unwrap();
    assert_eq!(b.error.as_deref(), Some("not found on server"));
    assert_eq!(session.store().unread_count().await, 2);
    assert_eq!(session.store().selected_job_id().await.as_deref(), Some("job-a"));
    assert!(session.store().last_sync_time().await.is_some());

    session.shutdown().await;
}

#[tokio::test]
async fn unreachable_batch_endpoint_exhausts_retries() {
    let backend = Arc::new(Backend::default());
    backend.fail_batch.store(true, Ordering::SeqCst);
    let storage = Arc::new(MemorySnapshotStorage::new());
    common::seed(&storage, &["job-a"]).await;

    let session = start(&backend, storage).await;
    session.focus_regained().await;
    session.focus_regained().await;

    assert!(eventually!(status_of(&session, "job-a").await == Some(TaskStatus::Failed)));
    let a = session.store().get("job-a").await.unwrap();
    assert_eq!(a.error.as_deref(), Some("sync exhausted"));
    assert_eq!(backend.batch_calls().len(), 3);

    session.shutdown().await;
}

#[tokio::test]
async fn push_update_settles_task() {
    let backend = Arc::new(Backend::default());
    backend.set_job("job-p", "PROCESSING");
    *backend.stream_body.lock().unwrap() = concat!(
        ": connected\n\n",
        "event: message\n",
        "data: {\"job_id\":\"job-p\",\"status\":\"COMPLETED\",\"result_url\":\"/static/pushed.png\",",
        "\"error\":null,\"updated_at\":\"2099-01-01T00:00:00Z\"}\n\n",
    )
    .to_string();
    let storage = Arc::new(MemorySnapshotStorage::new());
    common::seed(&storage, &["job-p"]).await;

    let session = start(&backend, storage).await;

    assert!(eventually!(status_of(&session, "job-p").await == Some(TaskStatus::Completed)));
    let task = session.store().get("job-p").await.unwrap();
    assert_eq!(task.result_url.as_deref(), Some("/static/pushed.png"));

    // A later poll reporting PROCESSING must not resurrect it.
    session.focus_regained().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(status_of(&session, "job-p").await, Some(TaskStatus::Completed));

    session.shutdown().await;
}

#[tokio::test]
async fn opened_view_follows_the_primary() {
    let backend = Arc::new(Backend::default());
    let session = start(&backend, Arc::new(MemorySnapshotStorage::new())).await;
    let view = session.open_view().await.unwrap();
    assert_ne!(view.view_id(), session.store().view_id());

    let job_id = session
        .submit(&SubmitRequest::new("a paper boat", GenerationMode::TextToImage))
        .await
        .unwrap();
    assert!(eventually!(view.get(&job_id).await.is_some()));

    view.mark_all_read().await.unwrap();
    view.select(Some(&job_id)).await.unwrap();
    assert!(eventually!(
        session.store().selected_job_id().await.as_deref() == Some(job_id.as_str())
    ));

    session.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_every_background_task() {
    let backend = Arc::new(Backend::default());
    let session = start(&backend, Arc::new(MemorySnapshotStorage::new())).await;
    session.open_view().await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), session.shutdown())
        .await
        .expect("shutdown should finish");
}
