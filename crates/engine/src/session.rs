//! One tracking session: a primary store view plus every background task
//! that keeps it current.

use std::sync::Arc;
use std::time::Duration;

use gentrack_client::{GenerationApi, PushListener};
use gentrack_core::clock::Clock;
use gentrack_core::submission::SubmitRequest;
use gentrack_core::types::JobId;
use gentrack_db::SnapshotStorage;
use gentrack_events::{EventBus, StoreEvent};
use gentrack_store::{replication, TaskStore};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::{ingest, sweeper, PollTrigger, Poller};

/// How long shutdown waits for each background task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const PUSH_CHANNEL_CAPACITY: usize = 256;
const TRIGGER_CHANNEL_CAPACITY: usize = 16;

/// A running session.
pub struct Session {
    store: Arc<TaskStore>,
    api: GenerationApi,
    storage: Arc<dyn SnapshotStorage>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    triggers: mpsc::Sender<PollTrigger>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Session {
    /// Hydrate the primary view and start every background task.
    ///
    /// Fires the [`PollTrigger::Hydrated`] poll once everything is running.
    pub async fn start(
        config: EngineConfig,
        storage: Arc<dyn SnapshotStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SessionError> {
        let bus = Arc::new(EventBus::default());
        let store = TaskStore::open(storage.clone(), bus.clone(), clock.clone(), config.policy).await?;
        let api = GenerationApi::new(config.api_base_url.clone());
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(("replication", replication::spawn(&store, cancel.child_token())));

        // Push listener feeding the ingest consumer.
        let (update_tx, update_rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        let listener = PushListener::new(api.clone(), config.reconnect_delay);
        let listener_cancel = cancel.child_token();
        tasks.push((
            "push_listener",
            tokio::spawn(async move { listener.run(update_tx, listener_cancel).await }),
        ));
        tasks.push((
            "push_consumer",
            tokio::spawn(ingest::run_push_consumer(store.clone(), update_rx, cancel.child_token())),
        ));

        // Poller.
        let (triggers, trigger_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
        let poller = Poller::new(store.clone(), api.clone(), config.poll_interval);
        tasks.push((
            "poller",
            tokio::spawn(poller.run(trigger_rx, store.subscribe(), cancel.child_token())),
        ));

        // Sweeper.
        tasks.push((
            "sweeper",
            tokio::spawn(sweeper::run(store.clone(), config.sweep_interval, cancel.child_token())),
        ));

        tracing::info!(
            view_id = %store.view_id(),
            api_base_url = %config.api_base_url,
            tasks = store.snapshot().await.tasks.len(),
            "Session started",
        );

        let session = Self {
            store,
            api,
            storage,
            bus,
            clock,
            config,
            triggers,
            cancel,
            tasks: Mutex::new(tasks),
        };
        session.trigger(PollTrigger::Hydrated).await;
        Ok(session)
    }

    /// The primary view.
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn api(&self) -> &GenerationApi {
        &self.api
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.bus.subscribe()
    }

    /// Validate and submit a generation job, then start tracking it.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<JobId, SessionError> {
        ingest::submit(&self.store, &self.api, request).await
    }

    /// The session regained user focus: poll now.
    pub async fn focus_regained(&self) {
        self.trigger(PollTrigger::FocusRegained).await;
    }

    /// Open another view of this session's task set.
    ///
    /// The view hydrates from the shared snapshot and keeps itself current
    /// through replication until the session shuts down.
    pub async fn open_view(&self) -> Result<Arc<TaskStore>, SessionError> {
        let view = TaskStore::open(
            self.storage.clone(),
            self.bus.clone(),
            self.clock.clone(),
            self.config.policy,
        )
        .await?;
        let handle = replication::spawn(&view, self.cancel.child_token());
        self.tasks.lock().await.push(("replication", handle));
        Ok(view)
    }

    /// Cancel every background task and wait for each to finish.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down session");
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for (name, handle) in tasks {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Background task stopped"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task panicked"),
                Err(_) => tracing::warn!(task = name, "Background task did not stop in time"),
            }
        }
        tracing::info!("Session shut down complete");
    }

    async fn trigger(&self, trigger: PollTrigger) {
        if self.triggers.send(trigger).await.is_err() {
            tracing::warn!(trigger = trigger.as_str(), "Poller is not running, trigger dropped");
        }
    }
}
