//! In-process event bus shared by every view of one session.
//!
//! - [`EventBus`]: publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`StoreEvent`]: replication signals and task settlement
//!   notifications emitted by the task store.

pub mod bus;

pub use bus::{EventBus, StoreEvent, ViewId};
