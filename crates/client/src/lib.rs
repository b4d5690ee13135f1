//! HTTP client for the generation backend.
//!
//! Provides the REST wrapper for submission and batch status
//! ([`api`]), the wire message types ([`messages`]), an incremental
//! Server-Sent Events decoder ([`sse`]) and the long-lived push listener
//! that turns the event stream into [`TaskUpdate`](gentrack_core::reconcile::TaskUpdate)s
//! ([`stream`]).

pub mod api;
pub mod messages;
pub mod sse;
pub mod stream;

pub use api::{ApiError, GenerationApi, MAX_BATCH_SIZE};
pub use stream::{PushListener, StreamError, DEFAULT_RECONNECT_DELAY};
