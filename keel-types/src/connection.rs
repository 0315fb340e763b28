//! Connection state snapshots.

use serde::{Deserialize, Serialize};

/// Externally visible connection status.
///
/// The monitor's internal machine has more states (e.g. waiting out a
/// reconnect backoff); they all surface as one of these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No transport connection, and no attempt in progress.
    Disconnected,
    /// A connect or reconnect sequence is in progress.
    Connecting,
    /// Transport is up.
    Connected,
    /// Transport is up but heartbeats are being missed.
    Degraded,
}

/// Read-only snapshot of the monitor's state.
///
/// A copy, never a live reference; it does not change after being returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Current status.
    pub status: ConnectionStatus,
    /// Failed reconnect attempts in the current sequence. Resets to 0 only
    /// on reaching [`ConnectionStatus::Connected`].
    pub reconnect_attempts: u32,
    /// When the status last changed, milliseconds since the Unix epoch.
    pub last_transition_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
