//! Transport abstraction for keel.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying connection mechanism (WebSocket, QUIC, mock for testing).
//! keel never implements a wire protocol; it only consumes this adapter.
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection
//! - `send()` transmits one queued operation
//! - `disconnect()` gracefully terminates
//! - `is_connected()` is the connectivity oracle the monitor reads
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect().await?;
//! transport.send(&item).await?;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use keel_types::QueueItem;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The transport primitive is absent in this environment.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// Operation timed out.
    #[error("transport timeout")]
    Timeout,
}

/// Transport trait for delivering operations to the remote peer.
///
/// Implementations handle the underlying connection mechanism; keel treats
/// the payload as opaque and never inspects the wire format.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Deliver one operation over the connection.
    async fn send(&self, item: &QueueItem) -> Result<(), TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;
}
