//! Periodic lifecycle sweep.
//!
//! Times out tasks stuck non-terminal for too long and evicts terminal
//! tasks past the eviction horizon. Runs on a fixed interval using
//! `tokio::time::interval`; the first pass runs immediately so stale
//! tasks from a previous run are handled at startup.

use std::sync::Arc;
use std::time::Duration;

use gentrack_store::TaskStore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(store: Arc<TaskStore>, period: Duration, cancel: CancellationToken) {
    let policy = *store.policy();
    tracing::info!(
        interval_secs = period.as_secs(),
        pending_timeout_secs = policy.pending_timeout.num_seconds(),
        eviction_horizon_secs = policy.eviction_horizon.num_seconds(),
        "Sweeper started",
    );

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match store.sweep().await {
                    Ok(report) if report.is_empty() => {
                        tracing::debug!("Sweep: nothing to do");
                    }
                    Ok(report) => {
                        tracing::info!(
                            evicted = ?report.evicted,
                            timed_out = ?report.timed_out,
                            "Sweep applied",
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Sweep failed");
                    }
                }
            }
        }
    }
}
