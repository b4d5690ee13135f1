//! Interval scheduling of the poller inside a running session.
//!
//! These go through loopback HTTP, so they run on real time with a short
//! period instead of paused time.

#[macro_use]
mod common;

use std::sync::Arc;
use std::time::Duration;

use gentrack_core::clock::SystemClock;
use gentrack_core::submission::SubmitRequest;
use gentrack_core::task::{GenerationMode, TaskStatus};
use gentrack_db::MemorySnapshotStorage;
use gentrack_engine::{EngineConfig, Session};

use common::Backend;

const PERIOD: Duration = Duration::from_millis(150);

async fn start(backend: &Arc<Backend>, storage: Arc<MemorySnapshotStorage>) -> Session {
    let base = common::spawn(backend.clone()).await;
    let config = EngineConfig {
        poll_interval: PERIOD,
        ..common::test_config(base)
    };
    Session::start(config, storage, Arc::new(SystemClock)).await.unwrap()
}

#[tokio::test]
async fn pending_task_is_polled_each_period_until_it_settles() {
    let backend = Arc::new(Backend::default());
    backend.set_job("job-a", "PROCESSING");
    let storage = Arc::new(MemorySnapshotStorage::new());
    common::seed(&storage, &["job-a"]).await;
    let session = start(&backend, storage).await;

    // Hydration plus at least three interval polls.
    assert!(eventually!(backend.batch_calls().len() >= 4));
    let calls = backend.batch_calls();
    for pair in calls[1..].windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= PERIOD / 2, "interval polls {gap:?} apart");
    }

    backend.set_job("job-a", "COMPLETED");
    assert!(eventually!(
        session.store().get("job-a").await.map(|t| t.status) == Some(TaskStatus::Completed)
    ));

    let settled_at = backend.batch_calls().len();
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(backend.batch_calls().len(), settled_at);

    session.shutdown().await;
}

#[tokio::test]
async fn interval_starts_when_a_task_is_submitted() {
    let backend = Arc::new(Backend::default());
    let session = start(&backend, Arc::new(MemorySnapshotStorage::new())).await;

    tokio::time::sleep(PERIOD * 3).await;
    assert!(backend.batch_calls().is_empty());

    let job_id = session
        .submit(&SubmitRequest::new("a quiet harbour", GenerationMode::TextToImage))
        .await
        .unwrap();
    assert!(eventually!(!backend.batch_calls().is_empty()));
    assert_eq!(backend.batch_calls()[0].task_ids, vec![job_id]);

    session.shutdown().await;
}
