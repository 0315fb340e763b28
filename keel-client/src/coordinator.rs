//! Sync coordinator: drains the offline queue when connectivity returns.
//!
//! The coordinator owns a registry of replay handlers keyed by operation
//! type. A drain walks the queue in replay order, runs each item through the
//! retry executor, removes items whose replay succeeded, and records the
//! failure on items whose replay exhausted its retries. Items with no
//! registered handler are left untouched.
//!
//! Only one drain runs at a time. A drain requested while another is in
//! flight coalesces: it returns immediately with an empty, `coalesced`
//! report rather than double-replaying.

use crate::queue::OfflineQueueStore;
use crate::retry::RetryExecutor;
use crate::storage::Storage;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use keel_types::{ConnectionStatus, ErrorRecord, QueueItem, RetryPolicy};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type ReplayFn = Arc<dyn Fn(QueueItem) -> BoxFuture<'static, Result<(), ErrorRecord>> + Send + Sync>;

/// Outcome of one queue drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Ids replayed and removed, in replay order.
    pub replayed: Vec<String>,
    /// Ids whose replay exhausted its retries; still queued.
    pub failed: Vec<String>,
    /// Ids with no registered handler; still queued.
    pub skipped: Vec<String>,
    /// True when this call joined an in-flight drain and did no work itself.
    pub coalesced: bool,
}

impl DrainReport {
    fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Self::default()
        }
    }
}

/// Replays queued operations once the transport is usable again.
pub struct SyncCoordinator<S: Storage> {
    queue: Arc<OfflineQueueStore<S>>,
    handlers: RwLock<HashMap<String, ReplayFn>>,
    fallback: RwLock<Option<ReplayFn>>,
    executor: RetryExecutor<()>,
    replay_policy: RetryPolicy,
    drain_lock: Mutex<()>,
}

impl<S: Storage + 'static> SyncCoordinator<S> {
    /// Create a coordinator over a queue store.
    pub fn new(queue: Arc<OfflineQueueStore<S>>, replay_policy: RetryPolicy) -> Self {
        Self {
            queue,
            handlers: RwLock::new(HashMap::new()),
            fallback: RwLock::new(None),
            executor: RetryExecutor::new(),
            replay_policy,
            drain_lock: Mutex::new(()),
        }
    }

    /// Register the replay handler for an operation type.
    ///
    /// Replaces any previous handler for the same type.
    pub async fn register<F, Fut>(&self, operation_type: &str, handler: F)
    where
        F: Fn(QueueItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ErrorRecord>> + Send + 'static,
    {
        let handler: ReplayFn = Arc::new(move |item| handler(item).boxed());
        self.handlers
            .write()
            .await
            .insert(operation_type.to_string(), handler);
    }

    /// Register a handler for operation types with no exact match.
    pub async fn register_fallback<F, Fut>(&self, handler: F)
    where
        F: Fn(QueueItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ErrorRecord>> + Send + 'static,
    {
        let handler: ReplayFn = Arc::new(move |item| handler(item).boxed());
        *self.fallback.write().await = Some(handler);
    }

    /// Drain the queue: replay every pending item in order.
    ///
    /// Coalesces with an in-flight drain instead of running concurrently.
    pub async fn drain(&self) -> Result<DrainReport, ErrorRecord> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            // Wait for the in-flight drain so the caller observes a queue
            // that has actually been worked, then report no work of our own.
            let _wait = self.drain_lock.lock().await;
            debug!("drain coalesced with an in-flight drain");
            return Ok(DrainReport::coalesced());
        };

        let items = self.queue.peek_all().await?;
        if items.is_empty() {
            return Ok(DrainReport::default());
        }
        info!(pending = items.len(), "draining offline queue");

        let mut report = DrainReport::default();
        for item in items {
            let id = item.id.clone();
            let Some(handler) = self.handler_for(&item.operation_type).await else {
                debug!(%id, operation_type = %item.operation_type, "no replay handler, skipping");
                report.skipped.push(id);
                continue;
            };

            let key = format!("replay:{id}");
            let outcome = self
                .executor
                .execute(&key, self.replay_policy, move || handler(item.clone()))
                .await;
            match outcome {
                Ok(()) => {
                    self.queue.remove(&id).await?;
                    report.replayed.push(id);
                }
                Err(record) => {
                    warn!(%id, error = %record, "replay failed, item retained");
                    self.queue.record_failure(&id, record).await?;
                    report.failed.push(id);
                }
            }
        }

        info!(
            replayed = report.replayed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "drain finished"
        );
        Ok(report)
    }

    /// Explicit user-requested drain. Same coalescing as [`drain`](Self::drain).
    pub async fn force_sync(&self) -> Result<DrainReport, ErrorRecord> {
        self.drain().await
    }

    /// Number of items still pending.
    pub async fn pending(&self) -> Result<usize, ErrorRecord> {
        self.queue.len().await
    }

    /// Spawn a watcher that drains whenever the status transitions into
    /// `Connected`. The task ends when the status channel closes.
    pub fn spawn_on_connect(
        self: &Arc<Self>,
        mut status: watch::Receiver<ConnectionStatus>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        // Sample the baseline status now, not at first poll: the task may not
        // run until after transitions that happen right after spawning.
        let mut prev = *status.borrow();
        tokio::spawn(async move {
            loop {
                if status.changed().await.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if current == ConnectionStatus::Connected && prev != ConnectionStatus::Connected {
                    if let Err(error) = coordinator.drain().await {
                        warn!(%error, "connectivity-triggered drain failed");
                    }
                }
                prev = current;
            }
        })
    }

    async fn handler_for(&self, operation_type: &str) -> Option<ReplayFn> {
        if let Some(handler) = self.handlers.read().await.get(operation_type) {
            return Some(Arc::clone(handler));
        }
        self.fallback.read().await.clone()
    }
}
