//! Domain model and pure reconciliation rules for tracked generation jobs.
//!
//! Nothing in this crate performs I/O. The store, the network client and
//! the background loops all delegate their decisions to the functions
//! here so they can be unit-tested without a runtime.

pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod notification;
pub mod reconcile;
pub mod submission;
pub mod task;
pub mod types;
