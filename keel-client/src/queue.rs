//! Durable offline operation queue.
//!
//! Operations that could not be delivered are parked here until the
//! connection monitor reports connectivity and the sync coordinator drains
//! them. The store keeps no in-memory view: every read goes through the
//! storage adapter, so readers always see what actually survived, and a
//! failed write leaves nothing half-applied.

use crate::storage::{Storage, StorageError};
use keel_types::{timestamp_ms, ErrorKind, ErrorRecord, QueueItem, Severity};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Durable, ordered queue of pending operations.
///
/// Replay order is strict global FIFO: `enqueued_at_ms` first, insertion
/// sequence as the tie-breaker.
pub struct OfflineQueueStore<S: Storage> {
    storage: S,
    next_seq: AtomicU64,
}

impl<S: Storage> OfflineQueueStore<S> {
    /// Open a store over a persisted medium.
    ///
    /// Scans existing records so insertion sequencing continues across
    /// restarts instead of colliding with surviving items.
    pub async fn open(storage: S) -> Result<Self, ErrorRecord> {
        let max_seq = {
            let entries = storage.list_all().await.map_err(storage_record)?;
            entries
                .iter()
                .filter_map(|(_, bytes)| serde_json::from_slice::<QueueItem>(bytes).ok())
                .map(|item| item.seq)
                .max()
                .unwrap_or(0)
        };
        Ok(Self {
            storage,
            next_seq: AtomicU64::new(max_seq + 1),
        })
    }

    /// Durably enqueue an operation.
    ///
    /// Assigns the insertion sequence and persists before returning; a
    /// successful return means the item survives a crash. On failure the
    /// caller must retain the payload - nothing was queued.
    pub async fn enqueue(&self, mut item: QueueItem) -> Result<QueueItem, ErrorRecord> {
        if self
            .storage
            .get(&item.id)
            .await
            .map_err(storage_record)?
            .is_some()
        {
            return Err(ErrorRecord::new(
                ErrorKind::Validation,
                Severity::Low,
                format!("queue item id already exists: {}", item.id),
            ));
        }

        item.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        if item.enqueued_at_ms == 0 {
            item.enqueued_at_ms = timestamp_ms();
        }

        let bytes = serde_json::to_vec(&item).map_err(encode_record)?;
        self.storage
            .put(&item.id, bytes)
            .await
            .map_err(storage_record)?;
        Ok(item)
    }

    /// All pending items in replay order.
    ///
    /// Corrupted records (unparsable documents) are skipped and logged; a
    /// single bad record must not block the queue.
    pub async fn peek_all(&self) -> Result<Vec<QueueItem>, ErrorRecord> {
        let entries = self.storage.list_all().await.map_err(storage_record)?;
        let mut items = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match serde_json::from_slice::<QueueItem>(&bytes) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(%key, error = %e, "skipping corrupted queue record");
                }
            }
        }
        items.sort_by_key(|item| (item.enqueued_at_ms, item.seq));
        Ok(items)
    }

    /// Remove an item after confirmed replay (or by explicit caller choice).
    pub async fn remove(&self, id: &str) -> Result<(), ErrorRecord> {
        self.storage.delete(id).await.map_err(storage_record)
    }

    /// Remove every item.
    pub async fn clear(&self) -> Result<(), ErrorRecord> {
        let entries = self.storage.list_all().await.map_err(storage_record)?;
        for (key, _) in entries {
            self.storage.delete(&key).await.map_err(storage_record)?;
        }
        Ok(())
    }

    /// Record a failed replay: bump `attempts`, remember the error.
    ///
    /// Missing or corrupted items are ignored - the failure being recorded
    /// is already reported through the drain outcome.
    pub async fn record_failure(&self, id: &str, error: ErrorRecord) -> Result<(), ErrorRecord> {
        let Some(bytes) = self.storage.get(id).await.map_err(storage_record)? else {
            return Ok(());
        };
        let Ok(mut item) = serde_json::from_slice::<QueueItem>(&bytes) else {
            return Ok(());
        };
        item.attempts = item.attempts.saturating_add(1);
        item.last_error = Some(error);
        let bytes = serde_json::to_vec(&item).map_err(encode_record)?;
        self.storage.put(id, bytes).await.map_err(storage_record)
    }

    /// Number of readable pending items.
    pub async fn len(&self) -> Result<usize, ErrorRecord> {
        Ok(self.peek_all().await?.len())
    }

    /// Check whether the queue holds no readable items.
    pub async fn is_empty(&self) -> Result<bool, ErrorRecord> {
        Ok(self.len().await? == 0)
    }
}

fn storage_record(error: StorageError) -> ErrorRecord {
    ErrorRecord::new(ErrorKind::System, Severity::High, error.to_string())
        .with_context("source", "offline_queue_storage")
}

fn encode_record(error: serde_json::Error) -> ErrorRecord {
    ErrorRecord::new(ErrorKind::System, Severity::High, error.to_string())
        .with_context("source", "offline_queue_encode")
}
