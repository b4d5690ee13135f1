//! Timeout and eviction rules applied by the periodic sweeper.

use chrono::Duration;

use crate::task::Task;
use crate::types::Timestamp;

/// Non-terminal tasks older than this are failed as "timed out".
pub const DEFAULT_PENDING_TIMEOUT_SECS: i64 = 60 * 60;

/// Terminal tasks untouched for longer than this are evicted.
pub const DEFAULT_EVICTION_HORIZON_SECS: i64 = 24 * 60 * 60;

/// What a sweep does to a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    Keep,
    /// Terminal and past the eviction horizon: delete.
    Evict,
    /// Non-terminal and past the pending timeout: fail with "timed out".
    TimeOut,
}

/// Time thresholds for the sweeper and the poll scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub pending_timeout: Duration,
    pub eviction_horizon: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::seconds(DEFAULT_PENDING_TIMEOUT_SECS),
            eviction_horizon: Duration::seconds(DEFAULT_EVICTION_HORIZON_SECS),
        }
    }
}

impl LifecyclePolicy {
    /// Classify a task for the current sweep. Never yields a completion.
    pub fn classify(&self, task: &Task, now: Timestamp) -> SweepAction {
        if task.is_terminal() {
            if now - task.updated_at > self.eviction_horizon {
                return SweepAction::Evict;
            }
        } else if now - task.created_at > self.pending_timeout {
            return SweepAction::TimeOut;
        }
        SweepAction::Keep
    }

    /// Whether a task still belongs in the outgoing batch poll.
    pub fn is_pollable(&self, task: &Task, now: Timestamp) -> bool {
        !task.is_terminal() && now - task.created_at <= self.eviction_horizon
    }
}
