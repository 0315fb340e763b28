//! # keel-types
//!
//! Shared data model for the keel resilience layer.
//!
//! This crate provides the foundational types used across all keel crates:
//! - [`ErrorKind`], [`Severity`], [`ErrorRecord`] - Normalized failure taxonomy
//! - [`QueueItem`] - A durably queued operation awaiting replay
//! - [`RetryPolicy`] - Bounded retry/backoff configuration
//! - [`ConnectionStatus`], [`ConnectionInfo`] - Connection state snapshots

#![warn(missing_docs)]
#![warn(clippy::all)]

mod connection;
mod error;
mod policy;
mod queue;
mod time;

pub use connection::{ConnectionInfo, ConnectionStatus};
pub use error::{ErrorKind, ErrorRecord, Severity};
pub use policy::RetryPolicy;
pub use queue::QueueItem;
pub use time::timestamp_ms;
