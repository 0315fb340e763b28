//! Durable queue item.

use crate::error::ErrorRecord;
use crate::time::timestamp_ms;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A queued operation awaiting replay.
///
/// The payload is opaque to the resilience layer; only the registered replay
/// handler for `operation_type` interprets it. Items are owned by the queue
/// store for their whole lifetime and are removed only after a confirmed
/// successful replay or an explicit caller removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique id within the store. Caller-assigned or generated (UUID v4).
    pub id: String,
    /// Routing key for replay handler lookup.
    pub operation_type: String,
    /// Opaque operation payload.
    pub payload: Value,
    /// Enqueue time, milliseconds since the Unix epoch. Primary replay order.
    pub enqueued_at_ms: u64,
    /// Insertion sequence number, assigned by the store. Tie-breaker for
    /// items enqueued within the same millisecond; survives restarts.
    pub seq: u64,
    /// Number of failed replay attempts so far. Only ever increases.
    pub attempts: u32,
    /// Outcome of the most recent failed replay, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorRecord>,
}

impl QueueItem {
    /// Create a new item with a generated id, stamped with the current time.
    ///
    /// `seq` starts at 0 and is assigned by the store on enqueue.
    pub fn new(operation_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation_type: operation_type.into(),
            payload,
            enqueued_at_ms: timestamp_ms(),
            seq: 0,
            attempts: 0,
            last_error: None,
        }
    }

    /// Use a caller-assigned id instead of the generated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
