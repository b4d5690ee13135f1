//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries [`StoreEvent`]s between the views of one session.
//! It is designed to be shared via `Arc<EventBus>`.

use gentrack_core::task::TaskStatus;
use gentrack_core::types::JobId;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StoreEvent
// ---------------------------------------------------------------------------

/// Identity of one store view, used to ignore our own replication signals.
pub type ViewId = Uuid;

/// Something a task store view did that other parties care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A view wrote a new snapshot to durable storage. Other views should
    /// reload it wholesale.
    SnapshotPersisted { origin: ViewId },

    /// A task moved from a non-terminal into a terminal status. Emitted
    /// exactly once per transition.
    TaskSettled {
        origin: ViewId,
        job_id: JobId,
        status: TaskStatus,
        error: Option<String>,
    },
}

impl StoreEvent {
    /// The view that produced the event.
    pub fn origin(&self) -> ViewId {
        match self {
            StoreEvent::SnapshotPersisted { origin } | StoreEvent::TaskSettled { origin, .. } => *origin,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use gentrack_events::{EventBus, StoreEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(StoreEvent::SnapshotPersisted { origin: uuid::Uuid::new_v4() });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: StoreEvent) {
        // A send error only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
