//! Connection state machine for keel.
//!
//! This module provides a pure, side-effect-free state machine for managing
//! connection lifecycle. The state machine takes events as input and produces
//! a new state plus a list of actions to execute.
//!
//! The actual I/O (connecting, sleeping out backoff timers) is performed by
//! keel-client, not by this module. This enables instant unit testing without
//! transport mocks.

use crate::backoff::retry_delay;
use keel_types::{ConnectionStatus, ErrorKind, ErrorRecord, RetryPolicy, Severity};
use std::time::Duration;

/// Reconnection behavior knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Failed reconnect attempts before the machine settles in
    /// `Disconnected` and leaves further reconnection to the caller.
    pub max_reconnect_attempts: u32,
    /// Base delay of the reconnect backoff sequence.
    pub reconnect_base_delay: Duration,
    /// Spread reconnect delays to avoid thundering herds after an outage.
    pub jitter: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_millis(500),
            jitter: true,
        }
    }
}

impl MonitorConfig {
    fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(self.reconnect_base_delay)
            .with_jitter(self.jitter)
    }

    fn cap(&self) -> u32 {
        self.max_reconnect_attempts.max(1)
    }
}

/// Connection state machine - NO I/O, just state transitions.
///
/// The attempt counters count *failed* reconnect attempts in the current
/// sequence and reset only on reaching `Connected` (or on an explicit new
/// connect request, which starts a fresh budget).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    /// No connection, no attempt in progress.
    Disconnected {
        /// Failed attempts from the sequence that ended here.
        attempts: u32,
    },
    /// A transport connect call is in flight.
    Connecting {
        /// Failed attempts so far in this sequence.
        attempt: u32,
    },
    /// Transport is up.
    Connected,
    /// Transport is up but heartbeats are being missed.
    Degraded,
    /// Waiting out a backoff delay before the next connect call.
    Reconnecting {
        /// Failed attempts so far in this sequence.
        attempt: u32,
    },
}

impl MonitorState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected { attempts: 0 }
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects beyond jitter randomness in
    /// computed delays. The caller (keel-client) is responsible for executing
    /// the returned actions.
    pub fn on_event(self, event: Event, cfg: &MonitorConfig) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected: an explicit request starts a fresh budget.
            (Self::Disconnected { .. }, Event::ConnectRequested) => {
                (Self::Connecting { attempt: 0 }, vec![Action::Connect])
            }

            // From Connecting
            (Self::Connecting { .. }, Event::ConnectSucceeded) => {
                (Self::Connected, vec![Action::Emit(MonitorEvent::Connected)])
            }
            (Self::Connecting { attempt }, Event::ConnectFailed { error }) => {
                let failed = attempt.saturating_add(1);
                if failed >= cfg.cap() {
                    let record = exhausted_record(failed, &error);
                    (
                        Self::Disconnected { attempts: failed },
                        vec![Action::Emit(MonitorEvent::ReconnectExhausted { record })],
                    )
                } else {
                    (
                        Self::Reconnecting { attempt: failed },
                        vec![
                            Action::Emit(MonitorEvent::ReconnectFailed {
                                attempt: failed,
                                error,
                            }),
                            Action::StartReconnectTimer {
                                delay: retry_delay(&cfg.reconnect_policy(), failed),
                            },
                        ],
                    )
                }
            }
            (Self::Connecting { attempt }, Event::DisconnectRequested) => {
                (Self::Disconnected { attempts: attempt }, vec![])
            }

            // From Connected
            (Self::Connected, Event::HeartbeatMissed) => {
                (Self::Degraded, vec![Action::Emit(MonitorEvent::Degraded)])
            }
            (Self::Connected, Event::ConnectionLost { reason }) => lost(reason, cfg),
            (Self::Connected, Event::DisconnectRequested) => closed(),

            // From Degraded
            (Self::Degraded, Event::HeartbeatRecovered) => {
                (Self::Connected, vec![Action::Emit(MonitorEvent::Recovered)])
            }
            (Self::Degraded, Event::ConnectionLost { reason }) => lost(reason, cfg),
            (Self::Degraded, Event::DisconnectRequested) => closed(),

            // From Reconnecting
            (Self::Reconnecting { attempt }, Event::ReconnectTimer) => {
                (Self::Connecting { attempt }, vec![Action::Connect])
            }
            (Self::Reconnecting { .. }, Event::ConnectSucceeded) => {
                (Self::Connected, vec![Action::Emit(MonitorEvent::Connected)])
            }
            (Self::Reconnecting { attempt }, Event::DisconnectRequested) => (
                Self::Disconnected { attempts: attempt },
                vec![Action::CancelReconnect],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Externally visible status for this state.
    pub fn status(&self) -> ConnectionStatus {
        match self {
            Self::Disconnected { .. } => ConnectionStatus::Disconnected,
            Self::Connecting { .. } | Self::Reconnecting { .. } => ConnectionStatus::Connecting,
            Self::Connected => ConnectionStatus::Connected,
            Self::Degraded => ConnectionStatus::Degraded,
        }
    }

    /// Failed reconnect attempts in the current (or last) sequence.
    pub fn reconnect_attempts(&self) -> u32 {
        match self {
            Self::Disconnected { attempts } => *attempts,
            Self::Connecting { attempt } | Self::Reconnecting { attempt } => *attempt,
            Self::Connected | Self::Degraded => 0,
        }
    }

    /// Check if currently connected (Degraded still counts: the transport is up).
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Degraded)
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

fn lost(reason: String, cfg: &MonitorConfig) -> (MonitorState, Vec<Action>) {
    (
        MonitorState::Reconnecting { attempt: 0 },
        vec![
            Action::Emit(MonitorEvent::Disconnected { reason }),
            Action::StartReconnectTimer {
                delay: retry_delay(&cfg.reconnect_policy(), 1),
            },
        ],
    )
}

fn closed() -> (MonitorState, Vec<Action>) {
    (
        MonitorState::Disconnected { attempts: 0 },
        vec![
            Action::Disconnect,
            Action::Emit(MonitorEvent::Disconnected {
                reason: "user requested".into(),
            }),
        ],
    )
}

fn exhausted_record(attempts: u32, last_error: &str) -> ErrorRecord {
    ErrorRecord::new(
        ErrorKind::ConnectionLost,
        Severity::High,
        format!("reconnect attempts exhausted: {last_error}"),
    )
    .with_context("attempts", attempts)
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller requested connection.
    ConnectRequested,
    /// Transport connection succeeded.
    ConnectSucceeded,
    /// Transport connection failed.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// A heartbeat/ack window elapsed without a response.
    HeartbeatMissed,
    /// Heartbeats resumed.
    HeartbeatRecovered,
    /// Connection was lost (transport event or host going offline).
    ConnectionLost {
        /// Reason for the loss.
        reason: String,
    },
    /// Caller requested disconnect.
    DisconnectRequested,
    /// Reconnect backoff timer fired.
    ReconnectTimer,
}

/// Actions to be executed by keel-client.
///
/// These are instructions, not side effects. keel-client interprets them and
/// performs the actual I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Initiate a transport connection.
    Connect,
    /// Disconnect the transport.
    Disconnect,
    /// Wait out a backoff delay, then feed [`Event::ReconnectTimer`].
    StartReconnectTimer {
        /// Delay before the next connect attempt.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Surface an event to the application.
    Emit(MonitorEvent),
}

/// Events surfaced to the application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Successfully connected.
    Connected,
    /// Heartbeats are being missed; the connection may be stale.
    Degraded,
    /// Heartbeats recovered.
    Recovered,
    /// Disconnected from the peer.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// A reconnection attempt failed; another is scheduled.
    ReconnectFailed {
        /// Which attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// The reconnect budget is spent; the machine settled in Disconnected.
    ReconnectExhausted {
        /// Classified record for surfacing to the user.
        record: ErrorRecord,
    },
}
