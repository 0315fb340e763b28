//! Mock transport for testing.
//!
//! Allows scripting connect/send failures and capturing sent operations.

use super::{Transport, TransportError};
use async_trait::async_trait;
use keel_types::QueueItem;
use std::sync::{Arc, Mutex};

/// Mock transport for testing.
///
/// Clones share state, so tests can hold one handle for scripting while the
/// component under test holds another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connect_calls: u32,
    sent: Vec<QueueItem>,
    fail_connects: u32,
    fail_connect_error: Option<String>,
    fail_next_send: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next `connect()` to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.fail_connects(1, error);
    }

    /// Cause the next `count` calls to `connect()` to fail.
    pub fn fail_connects(&self, count: u32, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_connects = count;
        inner.fail_connect_error = Some(error.to_string());
    }

    /// Cause the next `send()` to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// All operations that were sent.
    pub fn sent_items(&self) -> Vec<QueueItem> {
        let inner = self.inner.lock().unwrap();
        inner.sent.clone()
    }

    /// How many times `connect()` was called.
    pub fn connect_calls(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.connect_calls
    }

    /// Drop the connection without going through `disconnect()`.
    pub fn drop_connection(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
    }

    /// Clear all state (sent items, scripted failures, connection).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_calls += 1;

        if inner.fail_connects > 0 {
            inner.fail_connects -= 1;
            let error = inner
                .fail_connect_error
                .clone()
                .unwrap_or_else(|| "scripted failure".to_string());
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        Ok(())
    }

    async fn send(&self, item: &QueueItem) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent.push(item.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.connected
    }
}
