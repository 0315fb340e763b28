//! Persistence abstraction for the offline queue.
//!
//! The queue store never touches a concrete storage medium; it goes through
//! this adapter. An environment where storage is entirely unavailable is a
//! reportable error, never a crash.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use thiserror::Error;

/// Storage adapter errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage medium is not available at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The medium refused the write (quota, read-only, ...).
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// Underlying I/O failure.
    #[error("storage i/o error: {0}")]
    Io(String),
}

/// Key/value persistence adapter.
///
/// Keys are opaque identifiers chosen by the queue store (item ids). Values
/// are opaque bytes; the store serializes its own records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read one value. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write one value. Must be durable before returning `Ok`.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Delete one value. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// All stored entries, in no particular order.
    async fn list_all(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}
