//! In-process fake of the generation backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use gentrack_core::clock::SystemClock;
use gentrack_core::lifecycle::LifecyclePolicy;
use gentrack_core::task::{GenerationMode, TaskStatus};
use gentrack_db::MemorySnapshotStorage;
use gentrack_engine::EngineConfig;
use gentrack_events::EventBus;
use gentrack_store::TaskStore;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct FakeJob {
    pub status: &'static str,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

/// Recorded batch request.
#[derive(Debug, Clone)]
pub struct BatchCall {
    pub task_ids: Vec<String>,
    pub had_sync_time: bool,
    pub at: Instant,
}

#[derive(Default)]
pub struct Backend {
    pub jobs: Mutex<HashMap<String, FakeJob>>,
    pub batch_calls: Mutex<Vec<BatchCall>>,
    pub fail_batch: AtomicBool,
    pub generate_calls: AtomicUsize,
    pub stream_body: Mutex<String>,
}

impl Backend {
    pub fn set_job(&self, id: &str, status: &'static str) {
        self.jobs.lock().unwrap().insert(
            id.to_string(),
            FakeJob {
                status,
                result_url: (status == "COMPLETED").then(|| format!("/static/{id}.png")),
                error_message: (status == "FAILED").then(|| "generation failed".to_string()),
            },
        );
    }

    pub fn batch_calls(&self) -> Vec<BatchCall> {
        self.batch_calls.lock().unwrap().clone()
    }
}

/// Serve `backend` on an ephemeral port and return its base URL.
pub async fn spawn(backend: Arc<Backend>) -> String {
    let router = Router::new()
        .route("/api/assets/generate", post(generate))
        .route("/api/assets/batch-status", post(batch_status))
        .route("/api/assets/stream", get(stream))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn generate(State(backend): State<Arc<Backend>>, mut multipart: Multipart) -> Json<Value> {
    let n = backend.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let _ = field.bytes().await.unwrap();
    }
    let job_id = format!("job-{n}");
    backend.set_job(&job_id, "PENDING");
    Json(json!({"job_id": job_id, "status": "PENDING"}))
}

async fn batch_status(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    let task_ids: Vec<String> = body["task_ids"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    backend.batch_calls.lock().unwrap().push(BatchCall {
        task_ids: task_ids.clone(),
        had_sync_time: body.get("last_sync_time").is_some(),
        at: Instant::now(),
    });

    if backend.fail_batch.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "backend down").into_response();
    }

    let now = Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    let jobs = backend.jobs.lock().unwrap();
    let tasks: Vec<Value> = task_ids
        .iter()
        .filter_map(|id| jobs.get(id).map(|job| (id, job)))
        .map(|(id, job)| {
            json!({
                "job_id": id,
                "status": job.status,
                "asset_type": "IMAGE",
                "created_at": now,
                "updated_at": now,
                "result_url": job.result_url,
                "error_message": job.error_message,
            })
        })
        .collect();
    Json(json!({ "tasks": tasks })).into_response()
}

async fn stream(State(backend): State<Arc<Backend>>) -> impl IntoResponse {
    let body = backend.stream_body.lock().unwrap().clone();
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

/// Session config pointed at a fake backend, with timers slow enough that
/// only explicit triggers poll.
pub fn test_config(base_url: String) -> EngineConfig {
    EngineConfig {
        api_base_url: base_url,
        poll_interval: Duration::from_secs(3600),
        sweep_interval: Duration::from_secs(3600),
        reconnect_delay: Duration::from_millis(50),
        ..EngineConfig::default()
    }
}

/// Persist tasks into `storage` as a previous run would have.
pub async fn seed(storage: &Arc<MemorySnapshotStorage>, pending: &[&str]) {
    let store = TaskStore::open(
        storage.clone(),
        Arc::new(EventBus::default()),
        Arc::new(SystemClock),
        LifecyclePolicy::default(),
    )
    .await
    .unwrap();
    for id in pending {
        store
            .create(*id, GenerationMode::TextToImage, TaskStatus::Pending)
            .await
            .unwrap();
    }
}

/// Poll `check` every 10ms for up to five seconds.
#[macro_export]
macro_rules! eventually {
    ($check:expr) => {{
        let mut ok = false;
        for _ in 0..500 {
            if $check {
                ok = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        ok
    }};
}
