//! The task record store: canonical client-side view of every tracked job.
//!
//! A [`TaskStore`] is one *view* of a session's task set. All mutations
//! go through it, are applied atomically under its lock, persisted as a
//! versioned snapshot and announced on the shared
//! [`EventBus`](gentrack_events::EventBus). Other views of the same
//! session reload the snapshot when they see the announcement
//! ([`replication`]).

pub mod error;
pub mod replication;
pub mod snapshot;
pub mod store;

pub use error::StoreError;
pub use snapshot::{StoreSnapshot, StoreState};
pub use store::{ApplyOutcome, BatchOutcome, SweepReport, TaskStore};
