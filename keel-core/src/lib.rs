//! # keel-core
//!
//! Pure logic for keel (no I/O, instant tests).
//!
//! This crate implements classification rules, backoff arithmetic, and the
//! connection state machine without any network, disk, or timer I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (modulo explicit jitter randomness)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (connecting, persisting, sleeping) is performed by
//! `keel-client`, which interprets the actions produced by the state machine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod classify;
pub mod state;

pub use backoff::retry_delay;
pub use classify::{classify, classify_with_context, FailureTag, RawFailure, TransportHint};
pub use state::{Action, Event, MonitorConfig, MonitorEvent, MonitorState};
