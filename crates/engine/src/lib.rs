//! Session runtime for the generation task tracker.
//!
//! Wires the task store to its event sources: the push listener and its
//! ingest consumer, the batch poller, the sweeper and cross-view
//! replication. [`Session`] owns all of them under one cancellation token.

pub mod config;
pub mod error;
pub mod ingest;
pub mod poller;
pub mod session;
pub mod sweeper;

pub use config::{ConfigError, EngineConfig};
pub use error::SessionError;
pub use poller::{PollReport, PollTrigger, Poller};
pub use session::Session;
