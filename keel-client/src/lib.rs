//! # keel-client
//!
//! Async resilience layer for realtime clients: bounded retry, durable
//! offline queue, connection recovery, and a supervisor for otherwise-fatal
//! failures.
//!
//! ## Architecture
//!
//! The pure decision logic (classification rules, backoff arithmetic, the
//! connection state machine) lives in `keel-core`; this crate performs the
//! I/O those decisions call for. The pieces compose bottom-up:
//!
//! - [`RetryExecutor`] - bounded retry with backoff and per-key
//!   single-flight sessions
//! - [`ConnectionMonitor`] - drives the connection state machine against a
//!   [`Transport`] adapter
//! - [`OfflineQueueStore`] - durable FIFO queue over a [`Storage`] adapter
//! - [`SyncCoordinator`] - drains the queue when connectivity returns
//! - [`RecoverySupervisor`] - absorbs render/module-load failures and
//!   schedules recovery
//! - [`Keel`] - context object wiring the above together
//!
//! ## Example
//!
//! ```ignore
//! let transport = Arc::new(MyWebsocketTransport::new(url));
//! let storage = FileStorage::open("./queue").await?;
//! let keel = Keel::init(transport, storage, KeelConfig::default()).await?;
//!
//! keel.coordinator().register("send_message", replay_message).await;
//! keel.connect().await?;
//! keel.submit(QueueItem::new("send_message", payload)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod keel;
pub mod monitor;
pub mod queue;
pub mod report;
pub mod retry;
pub mod storage;
pub mod supervisor;
pub mod task;
pub mod transport;

pub use coordinator::{DrainReport, SyncCoordinator};
pub use keel::{Keel, KeelConfig, OperationOutcome};
pub use monitor::ConnectionMonitor;
pub use queue::OfflineQueueStore;
pub use report::{ErrorReporter, LogReporter, ReportError};
pub use retry::RetryExecutor;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use supervisor::{RecoveryState, RecoverySupervisor, SupervisorConfig};
pub use task::{schedule, TaskHandle};
pub use transport::{MockTransport, Transport, TransportError};

// The types crate is the shared vocabulary; re-export it whole.
pub use keel_types as types;
