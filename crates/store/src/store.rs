//! [`TaskStore`]: one view of a session's task set.
//!
//! Every mutating operation takes the view lock, changes the in-memory
//! state, re-serializes the whole state to durable storage and announces
//! the write on the event bus before releasing the lock. Interleavings
//! therefore only happen between whole operations.

use std::collections::HashSet;
use std::sync::Arc;

use gentrack_core::clock::Clock;
use gentrack_core::error::CoreError;
use gentrack_core::lifecycle::{LifecyclePolicy, SweepAction};
use gentrack_core::notification::{self, UnreadSummary};
use gentrack_core::reconcile::{self, Applied, DiscardReason, Merge, TaskUpdate};
use gentrack_core::task::{FailureReason, GenerationMode, Task, TaskStatus};
use gentrack_core::types::{JobId, Timestamp};
use gentrack_db::SnapshotStorage;
use gentrack_events::{EventBus, StoreEvent, ViewId};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::error::StoreError;
use crate::snapshot::{self, StoreSnapshot, StoreState};

/// What happened to a single incoming update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        /// The update moved the task into a terminal status.
        settled: bool,
    },
    Discarded(DiscardReason),
}

/// Result of reconciling one batch poll response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub discarded: usize,
    /// Requested ids missing from the response that were failed as zombies.
    pub lost: Vec<JobId>,
}

/// Result of one sweeper pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: Vec<JobId>,
    pub timed_out: Vec<JobId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.timed_out.is_empty()
    }
}

/// One view of the canonical task set of a session.
///
/// Constructed once per view via [`TaskStore::open`] and shared as
/// `Arc<TaskStore>`.
pub struct TaskStore {
    view_id: ViewId,
    state: Mutex<StoreState>,
    storage: Arc<dyn SnapshotStorage>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
}

impl TaskStore {
    /// Open a view and hydrate it from the persisted snapshot.
    ///
    /// A missing, malformed or incompatible snapshot yields an empty view.
    pub async fn open(
        storage: Arc<dyn SnapshotStorage>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        policy: LifecyclePolicy,
    ) -> Result<Arc<Self>, StoreError> {
        let store = Self {
            view_id: Uuid::new_v4(),
            state: Mutex::new(StoreState::default()),
            storage,
            bus,
            clock,
            policy,
        };
        store.reload().await?;
        tracing::debug!(view_id = %store.view_id, "Task store view opened");
        Ok(Arc::new(store))
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.bus.subscribe()
    }

    /// Replace the in-memory state with the persisted copy. No merge.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let loaded = match self.storage.load().await? {
            None => StoreState::default(),
            Some(payload) => match snapshot::decode(&payload) {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(
                        view_id = %self.view_id,
                        error = %e,
                        "Discarding unusable task snapshot",
                    );
                    StoreState::default()
                }
            },
        };
        tracing::debug!(view_id = %self.view_id, tasks = loaded.tasks.len(), "Task snapshot loaded");
        *state = loaded;
        Ok(())
    }

    // ---- mutations ----

    /// Track a newly submitted job.
    ///
    /// Returns `false` without touching anything if `id` is already
    /// tracked. Local creation never goes through the merge policy and
    /// never marks anything unread.
    pub async fn create(
        &self,
        id: impl Into<JobId>,
        mode: GenerationMode,
        status: TaskStatus,
    ) -> Result<bool, StoreError> {
        let id = id.into();
        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&id) {
            tracing::debug!(job_id = %id, "Task already tracked, create ignored");
            return Ok(false);
        }

        let task = Task::new(id.clone(), mode, status, self.clock.now());
        state.tasks.insert(id.clone(), task);
        tracing::info!(job_id = %id, mode = %mode, status = %status, "Task created");

        self.commit(&state, Vec::new()).await?;
        Ok(true)
    }

    /// Run one externally observed update through the merge policy.
    ///
    /// Only the ingest paths call this; presentation never does.
    pub async fn apply_update(&self, update: &TaskUpdate) -> Result<ApplyOutcome, StoreError> {
        let mut state = self.state.lock().await;
        match reconcile::merge(state.tasks.get(&update.id), update) {
            Merge::Discard(reason) => {
                tracing::debug!(
                    job_id = %update.id,
                    status = %update.status,
                    reason = reason.as_str(),
                    "Update discarded",
                );
                Ok(ApplyOutcome::Discarded(reason))
            }
            Merge::Apply(applied) => {
                let settled = applied.settled;
                let mut events = Vec::new();
                self.absorb(&mut state, applied, &mut events);
                self.commit(&state, events).await?;
                Ok(ApplyOutcome::Applied { settled })
            }
        }
    }

    /// Reconcile a successful batch poll.
    ///
    /// `requested` is the id set that was sent; `reported` is what came
    /// back. Reported updates go through the merge policy. Requested ids
    /// absent from the response are failed as lost when still non-terminal.
    /// Every requested task still tracked gets its retry counter reset.
    pub async fn apply_batch(
        &self,
        requested: &[JobId],
        reported: &[TaskUpdate],
    ) -> Result<BatchOutcome, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let mut events = Vec::new();
        let mut outcome = BatchOutcome::default();

        for update in reported {
            match reconcile::merge(state.tasks.get(&update.id), update) {
                Merge::Apply(applied) => {
                    self.absorb(&mut state, applied, &mut events);
                    outcome.applied += 1;
                }
                Merge::Discard(_) => outcome.discarded += 1,
            }
        }

        let reported_ids: HashSet<&str> = reported.iter().map(|u| u.id.as_str()).collect();
        for id in requested {
            if let Some(reset) = state.tasks.get(id).and_then(reconcile::reset_retries) {
                state.tasks.insert(id.clone(), reset);
            }
            if reported_ids.contains(id.as_str()) {
                continue;
            }
            if let Some(lost) = state.tasks.get(id).and_then(|t| reconcile::mark_lost(t, now)) {
                tracing::info!(job_id = %id, "Task missing from batch response, marked failed");
                events.push(self.settled_event(&lost));
                state.tasks.insert(id.clone(), lost);
                outcome.lost.push(id.clone());
            }
        }

        state.last_sync_time = Some(now);
        tracing::debug!(
            requested = requested.len(),
            applied = outcome.applied,
            discarded = outcome.discarded,
            lost = outcome.lost.len(),
            "Batch reconciled",
        );

        self.commit(&state, events).await?;
        Ok(outcome)
    }

    /// Count a transport failure for every task in a failed batch poll.
    ///
    /// Returns the ids that hit the retry ceiling and were failed.
    pub async fn record_poll_failure(&self, requested: &[JobId]) -> Result<Vec<JobId>, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let mut events = Vec::new();
        let mut exhausted = Vec::new();
        let mut changed = false;

        for id in requested {
            let Some(outcome) = state
                .tasks
                .get(id)
                .and_then(|t| reconcile::register_poll_failure(t, now))
            else {
                continue;
            };
            if outcome.exhausted {
                tracing::info!(job_id = %id, "Sync retries exhausted, marked failed");
                events.push(self.settled_event(&outcome.task));
                exhausted.push(id.clone());
            }
            state.tasks.insert(id.clone(), outcome.task);
            changed = true;
        }

        if changed {
            self.commit(&state, events).await?;
        }
        Ok(exhausted)
    }

    /// Apply the timeout and eviction rules to every task.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let mut events = Vec::new();
        let mut report = SweepReport::default();

        let actions: Vec<(JobId, SweepAction)> = state
            .tasks
            .values()
            .map(|t| (t.id.clone(), self.policy.classify(t, now)))
            .filter(|(_, action)| *action != SweepAction::Keep)
            .collect();

        for (id, action) in actions {
            match action {
                SweepAction::Evict => {
                    state.tasks.remove(&id);
                    report.evicted.push(id);
                }
                SweepAction::TimeOut => {
                    let Some(failed) = state
                        .tasks
                        .get(&id)
                        .and_then(|t| reconcile::force_fail(t, FailureReason::TimedOut, now))
                    else {
                        continue;
                    };
                    events.push(self.settled_event(&failed));
                    state.tasks.insert(id.clone(), failed);
                    report.timed_out.push(id);
                }
                SweepAction::Keep => {}
            }
        }

        if report.is_empty() {
            return Ok(report);
        }
        tracing::info!(
            evicted = report.evicted.len(),
            timed_out = report.timed_out.len(),
            "Sweep changed tasks",
        );
        self.commit(&state, events).await?;
        Ok(report)
    }

    /// Focus a task for detail display, or clear the focus with `None`.
    pub async fn select(&self, id: Option<&str>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(id) = id {
            if !state.tasks.contains_key(id) {
                return Err(CoreError::NotFound {
                    entity: "task",
                    id: id.to_string(),
                }
                .into());
            }
        }
        let next = id.map(str::to_string);
        if state.selected_job_id == next {
            return Ok(());
        }
        state.selected_job_id = next;
        self.commit(&state, Vec::new()).await
    }

    /// Acknowledge one task. Returns `true` if its flag changed.
    pub async fn mark_read(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(id) {
            Some(task) if !task.is_read => task.is_read = true,
            _ => return Ok(false),
        }
        self.commit(&state, Vec::new()).await?;
        Ok(true)
    }

    /// Acknowledge every task. Returns how many flags changed.
    pub async fn mark_all_read(&self) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for task in state.tasks.values_mut().filter(|t| !t.is_read) {
            task.is_read = true;
            changed += 1;
        }
        if changed > 0 {
            self.commit(&state, Vec::new()).await?;
        }
        Ok(changed)
    }

    /// Drop every task, the selection and the last sync time.
    ///
    /// The durable snapshot is deleted rather than overwritten; other views
    /// reload nothing and fall back to an empty state.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let removed = state.tasks.len();
        *state = StoreState::default();
        self.storage.clear().await?;
        tracing::info!(removed, "Task store cleared");
        self.bus.publish(StoreEvent::SnapshotPersisted {
            origin: self.view_id,
        });
        Ok(())
    }

    // ---- queries ----

    pub async fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::from_state(&*self.state.lock().await)
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.state.lock().await.tasks.get(id).cloned()
    }

    pub async fn selected_job_id(&self) -> Option<JobId> {
        self.state.lock().await.selected_job_id.clone()
    }

    pub async fn last_sync_time(&self) -> Option<Timestamp> {
        self.state.lock().await.last_sync_time
    }

    pub async fn unread_count(&self) -> usize {
        notification::unread_count(self.state.lock().await.tasks.values())
    }

    pub async fn unread_summary(&self) -> UnreadSummary {
        notification::summarize(self.state.lock().await.tasks.values())
    }

    /// Ids that belong in the next batch poll, oldest first.
    pub async fn pollable_ids(&self) -> Vec<JobId> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        let mut pollable: Vec<&Task> = state
            .tasks
            .values()
            .filter(|t| self.policy.is_pollable(t, now))
            .collect();
        pollable.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pollable.into_iter().map(|t| t.id.clone()).collect()
    }

    pub async fn has_pollable_tasks(&self) -> bool {
        let now = self.clock.now();
        let state = self.state.lock().await;
        state.tasks.values().any(|t| self.policy.is_pollable(t, now))
    }

    // ---- private helpers ----

    fn absorb(&self, state: &mut StoreState, applied: Applied, events: &mut Vec<StoreEvent>) {
        let Applied {
            task,
            settled,
            focus,
        } = applied;

        tracing::debug!(job_id = %task.id, status = %task.status, settled, "Update applied");
        if focus {
            state.selected_job_id = Some(task.id.clone());
        }
        if notification::should_alert(state.tasks.get(&task.id), &task) {
            events.push(self.settled_event(&task));
        }
        state.tasks.insert(task.id.clone(), task);
    }

    fn settled_event(&self, task: &Task) -> StoreEvent {
        StoreEvent::TaskSettled {
            origin: self.view_id,
            job_id: task.id.clone(),
            status: task.status,
            error: task.error.clone(),
        }
    }

    /// Persist the full state, announce the write, then emit settlements.
    ///
    /// Settlements are emitted even when persisting fails: the transition
    /// already happened in this view.
    async fn commit(&self, state: &StoreState, settled: Vec<StoreEvent>) -> Result<(), StoreError> {
        let result = self.persist(state).await;
        match &result {
            Ok(()) => self.bus.publish(StoreEvent::SnapshotPersisted {
                origin: self.view_id,
            }),
            Err(e) => tracing::error!(view_id = %self.view_id, error = %e, "Failed to persist task snapshot"),
        }
        for event in settled {
            self.bus.publish(event);
        }
        result
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let payload = snapshot::encode(state, self.clock.now())?;
        self.storage.save(&payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use gentrack_core::clock::ManualClock;
    use gentrack_db::MemorySnapshotStorage;

    async fn open_store() -> (Arc<TaskStore>, Arc<MemorySnapshotStorage>, Arc<ManualClock>) {
        let storage = Arc::new(MemorySnapshotStorage::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap(),
        ));
        let store = TaskStore::open(
            storage.clone(),
            Arc::new(EventBus::default()),
            clock.clone(),
            LifecyclePolicy::default(),
        )
        .await
        .unwrap();
        (store, storage, clock)
    }

    #[tokio::test]
    async fn create_is_idempotent_per_id() {
        let (store, storage, _) = open_store().await;
        assert!(store.create("a", GenerationMode::TextToImage, TaskStatus::Pending).await.unwrap());
        assert!(!store.create("a", GenerationMode::TextToVideo, TaskStatus::Processing).await.unwrap());

        let task = store.get("a").await.unwrap();
        assert_eq!(task.mode, GenerationMode::TextToImage);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn every_mutation_persists() {
        let (store, storage, clock) = open_store().await;
        store.create("a", GenerationMode::TextToImage, TaskStatus::Pending).await.unwrap();
        let update = TaskUpdate::new("a", TaskStatus::Completed, clock.now() + Duration::seconds(1));
        store.apply_update(&update).await.unwrap();
        store.mark_read("a").await.unwrap();
        store.select(None).await.unwrap();
        assert_eq!(storage.write_count(), 4);

        store.clear().await.unwrap();
        assert_eq!(storage.write_count(), 4);
        assert!(storage.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn select_unknown_task_is_not_found() {
        let (store, _, _) = open_store().await;
        let err = store.select(Some("missing")).await.unwrap_err();
        assert!(matches!(err, StoreError::Core(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn mark_read_on_unknown_task_is_noop() {
        let (store, storage, _) = open_store().await;
        assert!(!store.mark_read("missing").await.unwrap());
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn pollable_ids_are_oldest_first() {
        let (store, _, clock) = open_store().await;
        store.create("first", GenerationMode::TextToImage, TaskStatus::Pending).await.unwrap();
        clock.advance(Duration::seconds(1));
        store.create("second", GenerationMode::TextToImage, TaskStatus::Processing).await.unwrap();
        store.create("done", GenerationMode::TextToImage, TaskStatus::Completed).await.unwrap();

        assert_eq!(store.pollable_ids().await, vec!["first".to_string(), "second".to_string()]);
        assert!(store.has_pollable_tasks().await);
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let (store, _, clock) = open_store().await;
        store.create("a", GenerationMode::TextToImage, TaskStatus::Pending).await.unwrap();
        store
            .apply_batch(&["a".to_string()], &[TaskUpdate::new("a", TaskStatus::Completed, clock.now())])
            .await
            .unwrap();
        store.clear().await.unwrap();

        let snapshot = store.snapshot().await;
        assert!(snapshot.tasks.is_empty());
        assert!(snapshot.last_sync_time.is_none());
        assert!(snapshot.selected_job_id.is_none());
    }
}
