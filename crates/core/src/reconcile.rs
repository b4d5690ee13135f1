//! Merge policy for updates arriving from the push stream and batch polls.
//!
//! [`merge`] is the single decision point for every externally observed
//! update. The guards run in a fixed order:
//!
//! 1. unknown task: the id is not tracked locally, discard;
//! 2. staleness: the local record is newer than the update, discard unless
//!    the update is terminal; a non-terminal update never replaces a
//!    terminal status;
//! 3. no-op: nothing observable would change, discard;
//! 4. apply.
//!
//! Because terminal statuses are absorbing and everything else is
//! last-writer-wins on the server timestamp, the result does not depend on
//! the order in which a fixed set of updates is delivered.
//!
//! The forced transitions (zombie, timeout, retry ceiling) are also here so
//! every status change the store performs is expressed as a pure function.

use crate::task::{FailureReason, Task, TaskStatus};
use crate::types::{JobId, Timestamp};

/// Consecutive poll failures after which a task is failed locally.
pub const RETRY_CEILING: u32 = 3;

/// Normalized update shape shared by every ingest source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub id: JobId,
    pub status: TaskStatus,
    pub result_url: Option<String>,
    pub error: Option<String>,
    /// Authoritative timestamp of the reported state.
    pub server_time: Timestamp,
}

impl TaskUpdate {
    pub fn new(id: impl Into<JobId>, status: TaskStatus, server_time: Timestamp) -> Self {
        Self {
            id: id.into(),
            status,
            result_url: None,
            error: None,
            server_time,
        }
    }

    pub fn with_result_url(mut self, url: impl Into<String>) -> Self {
        self.result_url = Some(url.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Why an update was not applied. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownTask,
    Stale,
    Unchanged,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::UnknownTask => "unknown_task",
            DiscardReason::Stale => "stale",
            DiscardReason::Unchanged => "unchanged",
        }
    }
}

/// The record to write back plus the side effects the store must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub task: Task,
    /// The task moved from a non-terminal into a terminal status.
    pub settled: bool,
    /// The task just became `Completed` and should take the detail focus.
    pub focus: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Merge {
    Discard(DiscardReason),
    Apply(Applied),
}

/// Decide what an incoming update does to the current record.
pub fn merge(current: Option<&Task>, incoming: &TaskUpdate) -> Merge {
    let Some(current) = current else {
        return Merge::Discard(DiscardReason::UnknownTask);
    };

    if is_stale(current, incoming) {
        return Merge::Discard(DiscardReason::Stale);
    }

    let result_url = incoming
        .result_url
        .clone()
        .or_else(|| current.result_url.clone());
    let error = incoming.error.clone().or_else(|| current.error.clone());

    if incoming.status == current.status && result_url == current.result_url && error == current.error {
        return Merge::Discard(DiscardReason::Unchanged);
    }

    let settled = !current.status.is_terminal() && incoming.status.is_terminal();
    let focus = incoming.status == TaskStatus::Completed && current.status != TaskStatus::Completed;

    let mut next = current.clone();
    next.status = incoming.status;
    next.result_url = result_url;
    next.error = error;
    next.updated_at = incoming.server_time;
    next.retry_count = 0;
    if settled {
        next.is_read = false;
    }

    Merge::Apply(Applied {
        task: next,
        settled,
        focus,
    })
}

fn is_stale(current: &Task, incoming: &TaskUpdate) -> bool {
    if incoming.status.is_terminal() {
        return false;
    }
    current.status.is_terminal() || current.updated_at > incoming.server_time
}

/// Force a non-terminal task into `Failed` with a locally inferred reason.
///
/// Returns `None` when the task is already terminal. Bypasses the
/// staleness guard: the caller's observation is itself authoritative.
pub fn force_fail(current: &Task, reason: FailureReason, now: Timestamp) -> Option<Task> {
    if current.is_terminal() {
        return None;
    }
    let mut next = current.clone();
    next.status = TaskStatus::Failed;
    next.error = Some(reason.as_str().to_string());
    next.updated_at = now;
    next.is_read = false;
    Some(next)
}

/// A task that was requested in a batch poll but is absent from the response.
pub fn mark_lost(current: &Task, now: Timestamp) -> Option<Task> {
    force_fail(current, FailureReason::NotFoundOnServer, now)
}

/// Result of recording one failed poll against a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    pub task: Task,
    /// The retry ceiling was reached and the task is now `Failed`.
    pub exhausted: bool,
}

/// Count a transport failure of a batch poll that included `current`.
///
/// Terminal tasks are left untouched. Reaching [`RETRY_CEILING`] fails the
/// task with [`FailureReason::SyncExhausted`].
pub fn register_poll_failure(current: &Task, now: Timestamp) -> Option<RetryOutcome> {
    if current.is_terminal() {
        return None;
    }
    let mut counted = current.clone();
    counted.retry_count = current.retry_count.saturating_add(1);

    if counted.retry_count >= RETRY_CEILING {
        let failed = force_fail(&counted, FailureReason::SyncExhausted, now)?;
        return Some(RetryOutcome {
            task: failed,
            exhausted: true,
        });
    }

    Some(RetryOutcome {
        task: counted,
        exhausted: false,
    })
}

/// Clear the failure counter after a successful poll.
///
/// Returns `None` when there is nothing to reset.
pub fn reset_retries(current: &Task) -> Option<Task> {
    if current.retry_count == 0 {
        return None;
    }
    let mut next = current.clone();
    next.retry_count = 0;
    Some(next)
}
