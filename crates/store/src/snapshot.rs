//! In-memory state of a view and its persisted envelope.
//!
//! The persisted form is `{"version": 1, "saved_at": ..., "state": {...}}`.
//! Other components must not parse it; they go through
//! [`TaskStore`](crate::TaskStore).

use std::collections::HashMap;

use gentrack_core::notification;
use gentrack_core::task::Task;
use gentrack_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

/// Bump when the persisted layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything a view tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
    pub tasks: HashMap<JobId, Task>,
    /// Instant of the last successful batch reconciliation.
    #[serde(default)]
    pub last_sync_time: Option<Timestamp>,
    /// Task focused for detail display. A plain cross-reference: it may
    /// outlive the task it points to.
    #[serde(default)]
    pub selected_job_id: Option<JobId>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    saved_at: Timestamp,
    state: &'a StoreState,
}

#[derive(Deserialize)]
struct Envelope {
    state: StoreState,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Why a persisted blob could not be used.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Serialize the full state into the persisted envelope.
pub fn encode(state: &StoreState, saved_at: Timestamp) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EnvelopeRef {
        version: SNAPSHOT_VERSION,
        saved_at,
        state,
    })
}

/// Parse a persisted envelope, rejecting other versions.
pub fn decode(payload: &str) -> Result<StoreState, SnapshotError> {
    let probe: VersionProbe = serde_json::from_str(payload)?;
    if probe.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: probe.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    let envelope: Envelope = serde_json::from_str(payload)?;
    Ok(envelope.state)
}

// ---------------------------------------------------------------------------
// StoreSnapshot
// ---------------------------------------------------------------------------

/// Owned, read-only copy of a view for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Newest first.
    pub tasks: Vec<Task>,
    pub last_sync_time: Option<Timestamp>,
    pub selected_job_id: Option<JobId>,
}

impl StoreSnapshot {
    pub(crate) fn from_state(state: &StoreState) -> Self {
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            tasks,
            last_sync_time: state.last_sync_time,
            selected_job_id: state.selected_job_id.clone(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// The focused task, if it is still tracked.
    pub fn selected_task(&self) -> Option<&Task> {
        self.selected_job_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn unread_count(&self) -> usize {
        notification::unread_count(&self.tasks)
    }
}
