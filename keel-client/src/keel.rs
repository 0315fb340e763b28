//! The top-level keel context.
//!
//! [`Keel`] wires the parts together: monitor over a transport, durable
//! queue over a storage adapter, coordinator draining the queue whenever the
//! monitor reports connectivity. It is an explicit context object with
//! defined init and teardown, not ambient state; an application holds one
//! per transport session and drops it (or calls [`close`](Keel::close)) on
//! shutdown.
//!
//! The facade also carries the two caller-facing entry points of the error
//! path: [`handle_error`](Keel::handle_error) (classify and report) and
//! [`submit`](Keel::submit) (deliver now, or park in the queue).

use crate::coordinator::{DrainReport, SyncCoordinator};
use crate::monitor::ConnectionMonitor;
use crate::queue::OfflineQueueStore;
use crate::report::ErrorReporter;
use crate::retry::RetryExecutor;
use crate::storage::Storage;
use crate::transport::{Transport, TransportError};
use keel_core::classify::{classify_with_context, severity_for, RawFailure};
use keel_core::MonitorConfig;
use keel_types::{
    ConnectionInfo, ConnectionStatus, ErrorKind, ErrorRecord, QueueItem, RetryPolicy,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Construction-time configuration for a [`Keel`] context.
#[derive(Clone, Default)]
pub struct KeelConfig {
    /// Reconnection behavior of the connection monitor.
    pub monitor: MonitorConfig,
    /// Default policy for [`Keel::execute`] and [`Keel::submit`].
    pub retry: RetryPolicy,
    /// Policy the coordinator applies to each replayed item.
    pub replay: RetryPolicy,
    /// Optional external sink for classified records.
    pub reporter: Option<Arc<dyn ErrorReporter>>,
}

/// Outcome of a [`Keel::submit`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// Delivered over the transport.
    Delivered,
    /// Parked in the offline queue; will replay when connectivity returns.
    Queued(QueueItem),
}

/// One resilience context: monitor + queue + coordinator over a transport
/// and a storage adapter.
pub struct Keel<T: Transport, S: Storage> {
    transport: Arc<T>,
    monitor: Arc<ConnectionMonitor<T>>,
    queue: Arc<OfflineQueueStore<S>>,
    coordinator: Arc<SyncCoordinator<S>>,
    executor: RetryExecutor<Value>,
    retry: RetryPolicy,
    reporter: Option<Arc<dyn ErrorReporter>>,
    drain_watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<T, S> Keel<T, S>
where
    T: Transport + 'static,
    S: Storage + 'static,
{
    /// Initialize a context: open the queue over `storage`, wire the
    /// coordinator to drain whenever the monitor reaches `Connected`.
    ///
    /// Does not connect; call [`connect`](Self::connect) when ready.
    pub async fn init(transport: Arc<T>, storage: S, cfg: KeelConfig) -> Result<Arc<Self>, ErrorRecord> {
        let queue = Arc::new(OfflineQueueStore::open(storage).await?);
        let monitor = Arc::new(ConnectionMonitor::new(Arc::clone(&transport), cfg.monitor));
        let coordinator = Arc::new(SyncCoordinator::new(Arc::clone(&queue), cfg.replay));
        let watcher = coordinator.spawn_on_connect(monitor.subscribe());

        info!("keel context initialized");
        Ok(Arc::new(Self {
            transport,
            monitor,
            queue,
            coordinator,
            executor: RetryExecutor::new(),
            retry: cfg.retry,
            reporter: cfg.reporter,
            drain_watcher: Mutex::new(Some(watcher)),
        }))
    }

    /// Classify a raw failure, forward it to the reporter, return the record.
    ///
    /// A failing reporter is logged and discarded; it never masks or
    /// replaces the record.
    pub async fn handle_error(&self, raw: Option<&RawFailure<'_>>) -> ErrorRecord {
        self.handle_error_with_context(raw, Map::new()).await
    }

    /// [`handle_error`](Self::handle_error) with caller context attached.
    pub async fn handle_error_with_context(
        &self,
        raw: Option<&RawFailure<'_>>,
        context: Map<String, Value>,
    ) -> ErrorRecord {
        let record = classify_with_context(raw, context);
        if let Some(reporter) = &self.reporter {
            if let Err(error) = reporter.report(&record).await {
                debug!(%error, "error reporter failed, discarding");
            }
        }
        record
    }

    /// Run `op` under the context's default retry policy.
    pub async fn execute<F, Fut>(&self, key: &str, op: F) -> Result<Value, ErrorRecord>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, ErrorRecord>> + Send + 'static,
    {
        self.executor.execute(key, self.retry, op).await
    }

    /// Run `op` under an explicit policy.
    pub async fn execute_with_policy<F, Fut>(
        &self,
        key: &str,
        policy: RetryPolicy,
        op: F,
    ) -> Result<Value, ErrorRecord>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, ErrorRecord>> + Send + 'static,
    {
        self.executor.execute(key, policy, op).await
    }

    /// Deliver an operation now, or park it for later.
    ///
    /// Offline, the item goes straight to the queue. Online, it is sent
    /// with retries; if retries exhaust on a transient failure the item is
    /// queued with the failure recorded. Non-transient failures are
    /// returned to the caller - queueing a validation error would just
    /// replay the same rejection later.
    pub async fn submit(&self, item: QueueItem) -> Result<OperationOutcome, ErrorRecord> {
        if !self.monitor.is_connected().await {
            let queued = self.queue.enqueue(item).await?;
            debug!(id = %queued.id, "offline, operation queued");
            return Ok(OperationOutcome::Queued(queued));
        }

        let key = format!("submit:{}", item.id);
        let transport = Arc::clone(&self.transport);
        let send_item = item.clone();
        let result = self
            .executor
            .execute(&key, self.retry, move || {
                let transport = Arc::clone(&transport);
                let item = send_item.clone();
                async move {
                    transport
                        .send(&item)
                        .await
                        .map(|()| Value::Null)
                        .map_err(|e| transport_record(&e))
                }
            })
            .await;

        match result {
            Ok(_) => Ok(OperationOutcome::Delivered),
            Err(record) if record.kind.is_retryable() => {
                let mut item = item;
                item.last_error = Some(record);
                let queued = self.queue.enqueue(item).await?;
                debug!(id = %queued.id, "delivery exhausted retries, operation queued");
                Ok(OperationOutcome::Queued(queued))
            }
            Err(record) => Err(record),
        }
    }

    /// Connect the transport (bounded reconnect sequence on failure).
    pub async fn connect(&self) -> Result<(), ErrorRecord> {
        self.monitor.connect().await
    }

    /// One immediate reconnect attempt; fails fast.
    pub async fn force_reconnect(&self) -> Result<(), ErrorRecord> {
        self.monitor.force_reconnect().await
    }

    /// Host lifecycle signal: came online.
    pub async fn notify_online(&self) -> Result<(), ErrorRecord> {
        self.monitor.notify_online().await
    }

    /// Host lifecycle signal: went offline.
    pub async fn notify_offline(&self, reason: &str) -> Result<(), ErrorRecord> {
        self.monitor.notify_offline(reason).await
    }

    /// Snapshot of the connection state.
    pub async fn connection_info(&self) -> ConnectionInfo {
        self.monitor.connection_info().await
    }

    /// Subscribe to connection status transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.monitor.subscribe()
    }

    /// Explicit drain of the offline queue.
    pub async fn force_sync(&self) -> Result<DrainReport, ErrorRecord> {
        self.coordinator.force_sync().await
    }

    /// Number of operations waiting in the offline queue.
    pub async fn pending(&self) -> Result<usize, ErrorRecord> {
        self.queue.len().await
    }

    /// The coordinator, for registering replay handlers.
    pub fn coordinator(&self) -> &Arc<SyncCoordinator<S>> {
        &self.coordinator
    }

    /// The queue store, for direct queue management.
    pub fn queue(&self) -> &Arc<OfflineQueueStore<S>> {
        &self.queue
    }

    /// Tear down: stop the drain watcher, disconnect, settle Disconnected.
    pub async fn close(&self) {
        if let Some(watcher) = self
            .drain_watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            watcher.abort();
        }
        self.monitor.close().await;
        info!("keel context closed");
    }
}

fn transport_record(error: &TransportError) -> ErrorRecord {
    let kind = match error {
        TransportError::ConnectionFailed(_) | TransportError::NotConnected => {
            ErrorKind::ConnectionLost
        }
        TransportError::SendFailed(_) | TransportError::Timeout => ErrorKind::Network,
        TransportError::Unavailable(_) => ErrorKind::WebsocketError,
    };
    ErrorRecord::new(kind, severity_for(kind), error.to_string()).with_context("source", "transport")
}
