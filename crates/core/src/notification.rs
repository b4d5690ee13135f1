//! Read-only projection from task state to unread / alert signals.

use crate::task::{Task, TaskStatus};

/// A terminal task the user has not acknowledged yet.
pub fn is_unread(task: &Task) -> bool {
    task.is_terminal() && !task.is_read
}

/// Number of unacknowledged terminal tasks.
pub fn unread_count<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> usize {
    tasks.into_iter().filter(|t| is_unread(t)).count()
}

/// Whether moving from `previous` to `next` should raise an alert.
///
/// True exactly when the task became unread in this step, so repeated
/// identical updates never alert twice.
pub fn should_alert(previous: Option<&Task>, next: &Task) -> bool {
    is_unread(next) && !previous.is_some_and(is_unread)
}

/// Unread counts split by outcome, for badge rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadSummary {
    pub completed: usize,
    pub failed: usize,
}

impl UnreadSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

pub fn summarize<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> UnreadSummary {
    tasks
        .into_iter()
        .filter(|t| is_unread(t))
        .fold(UnreadSummary::default(), |mut acc, t| {
            match t.status {
                TaskStatus::Completed => acc.completed += 1,
                TaskStatus::Failed => acc.failed += 1,
                TaskStatus::Pending | TaskStatus::Processing => {}
            }
            acc
        })
}
