//! Normalized failure taxonomy.
//!
//! Every failure caught anywhere in the layer is converted into an
//! [`ErrorRecord`] exactly once and never mutated afterwards. The record's
//! [`ErrorKind`] drives all downstream policy: whether a retry is attempted,
//! whether the operation is queued for later replay, and how the failure is
//! surfaced.

use crate::time::timestamp_ms;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Classified failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Generic network failure (timeout, transient HTTP-level error).
    Network,
    /// The network path itself is gone (fetch rejected, DNS failure, offline).
    ConnectionLost,
    /// Socket-level transport failure, or the socket capability is absent.
    WebsocketError,
    /// Structural or input validation failure. Never retried.
    Validation,
    /// Domain rule violation, tagged by the caller. Never retried.
    Business,
    /// Internal fault with a recognizable origin.
    System,
    /// A lazily loaded code module failed to fetch (stale client after deploy).
    ChunkLoad,
    /// Anything that matched no rule, including absent input.
    Unknown,
}

impl ErrorKind {
    /// Whether retrying the failed operation can plausibly succeed.
    ///
    /// Validation and business failures are deterministic: repeating the call
    /// reproduces the failure. Chunk-load failures are recovered by reload,
    /// not by re-running the async path. Unknown failures are surfaced rather
    /// than retried blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::ConnectionLost | Self::WebsocketError | Self::System
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::ConnectionLost => "connection_lost",
            Self::WebsocketError => "websocket_error",
            Self::Validation => "validation",
            Self::Business => "business",
            Self::System => "system",
            Self::ChunkLoad => "chunk_load",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How loudly a failure should be surfaced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected, user-correctable.
    Low,
    /// Worth a toast/banner.
    Medium,
    /// Degrades the session.
    High,
    /// The session cannot continue.
    Critical,
}

/// A classified, immutable failure record.
///
/// Created by the classifier (or by components that already know the kind,
/// such as the queue reporting a storage fault) and passed around by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Classified category.
    pub kind: ErrorKind,
    /// Surfacing priority.
    pub severity: Severity,
    /// Human-readable description of the failure.
    pub message: String,
    /// Open bag of caller-supplied context (operation name, entity id, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl ErrorRecord {
    /// Create a record stamped with the current time.
    pub fn new(kind: ErrorKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            context: Map::new(),
            timestamp_ms: timestamp_ms(),
        }
    }

    /// Attach a context entry (builder style, used at creation time).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Merge a whole context map (builder style).
    pub fn with_context_map(mut self, context: Map<String, Value>) -> Self {
        self.context.extend(context);
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ErrorRecord {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::ConnectionLost.is_retryable());
        assert!(ErrorKind::WebsocketError.is_retryable());
        assert!(ErrorKind::System.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Business.is_retryable());
        assert!(!ErrorKind::ChunkLoad.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn record_is_stamped() {
        let record = ErrorRecord::new(ErrorKind::Network, Severity::Medium, "timed out");
        assert!(record.timestamp_ms > 0);
        assert_eq!(record.to_string(), "network: timed out");
    }

    #[test]
    fn context_builder_accumulates() {
        let record = ErrorRecord::new(ErrorKind::Business, Severity::Medium, "limit reached")
            .with_context("operation", "create_note")
            .with_context("attempts", 2);
        assert_eq!(record.context.len(), 2);
        assert_eq!(record.context["operation"], "create_note");
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = ErrorRecord::new(ErrorKind::ConnectionLost, Severity::High, "offline")
            .with_context("url", "wss://relay.example");
        let json = serde_json::to_string(&record).unwrap();
        let back: ErrorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ErrorRecord>();
    }
}
