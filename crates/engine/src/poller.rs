//! Batch status poller.
//!
//! The push stream is best-effort; the poller is the reconciliation path
//! that catches whatever it missed. A poll is triggered on hydration, when
//! focus returns to the session and on a fixed interval. The interval
//! ticker only exists while there is something to poll, and its first tick
//! comes one full period after it is created.

use std::sync::Arc;
use std::time::Duration;

use gentrack_client::{GenerationApi, MAX_BATCH_SIZE};
use gentrack_core::reconcile::TaskUpdate;
use gentrack_core::types::JobId;
use gentrack_events::StoreEvent;
use gentrack_store::TaskStore;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Why a poll was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTrigger {
    /// The store finished loading its persisted snapshot.
    Hydrated,
    /// The session regained user focus.
    FocusRegained,
    Interval,
}

impl PollTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollTrigger::Hydrated => "hydrated",
            PollTrigger::FocusRegained => "focus_regained",
            PollTrigger::Interval => "interval",
        }
    }
}

/// Outcome of one poll across all chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub requested: usize,
    /// Number of batch requests sent.
    pub chunks: usize,
    pub failed_chunks: usize,
    pub applied: usize,
    pub lost: Vec<JobId>,
    pub exhausted: Vec<JobId>,
}

pub struct Poller {
    store: Arc<TaskStore>,
    api: GenerationApi,
    period: Duration,
}

impl Poller {
    pub fn new(store: Arc<TaskStore>, api: GenerationApi, period: Duration) -> Self {
        Self { store, api, period }
    }

    /// Poll every pollable task once, in chunks of [`MAX_BATCH_SIZE`].
    ///
    /// Sends nothing when no task is pollable. Each chunk is reconciled or
    /// failed on its own.
    pub async fn poll_once(&self, trigger: PollTrigger) -> PollReport {
        let ids = self.store.pollable_ids().await;
        let mut report = PollReport {
            requested: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            tracing::debug!(trigger = trigger.as_str(), "Nothing to poll");
            return report;
        }

        for chunk in ids.chunks(MAX_BATCH_SIZE) {
            report.chunks += 1;
            let last_sync_time = self.store.last_sync_time().await;

            match self.api.batch_status(chunk, last_sync_time).await {
                Ok(tasks) => {
                    let updates: Vec<TaskUpdate> = tasks.into_iter().map(TaskUpdate::from).collect();
                    match self.store.apply_batch(chunk, &updates).await {
                        Ok(outcome) => {
                            report.applied += outcome.applied;
                            report.lost.extend(outcome.lost);
                        }
                        Err(e) => tracing::error!(error = %e, "Failed to reconcile batch status"),
                    }
                }
                Err(e) => {
                    report.failed_chunks += 1;
                    tracing::warn!(
                        trigger = trigger.as_str(),
                        tasks = chunk.len(),
                        error = %e,
                        "Batch status request failed",
                    );
                    match self.store.record_poll_failure(chunk).await {
                        Ok(exhausted) => report.exhausted.extend(exhausted),
                        Err(e) => tracing::error!(error = %e, "Failed to record poll failure"),
                    }
                }
            }
        }

        tracing::info!(
            trigger = trigger.as_str(),
            requested = report.requested,
            applied = report.applied,
            lost = report.lost.len(),
            failed_chunks = report.failed_chunks,
            "Poll finished",
        );
        report
    }

    /// Run the poll scheduler until cancelled.
    ///
    /// `triggers` carries the on-demand triggers. `events` is used to
    /// start or stop the interval ticker as tasks appear and settle.
    pub async fn run(
        self,
        mut triggers: mpsc::Receiver<PollTrigger>,
        mut events: broadcast::Receiver<StoreEvent>,
        cancel: CancellationToken,
    ) {
        tracing::info!(interval_secs = self.period.as_secs(), "Poller started");
        let mut ticker: Option<Interval> = None;
        let mut triggers_open = true;
        let mut events_open = true;

        loop {
            self.refresh_ticker(&mut ticker).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                trigger = triggers.recv(), if triggers_open => match trigger {
                    Some(trigger) => {
                        self.poll_once(trigger).await;
                    }
                    None => triggers_open = false,
                },
                _ = tick(&mut ticker) => {
                    self.poll_once(PollTrigger::Interval).await;
                }
                event = events.recv(), if events_open => {
                    if let Err(RecvError::Closed) = event {
                        events_open = false;
                    }
                }
            }
        }

        tracing::info!("Poller stopping");
    }

    async fn refresh_ticker(&self, ticker: &mut Option<Interval>) {
        let active = self.store.has_pollable_tasks().await;
        match (active, ticker.is_some()) {
            (true, false) => {
                let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *ticker = Some(interval);
                tracing::debug!("Interval polling started");
            }
            (false, true) => {
                *ticker = None;
                tracing::debug!("Interval polling stopped");
            }
            _ => {}
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
