//! Connection monitor.
//!
//! [`ConnectionMonitor`] owns the pure state machine from keel-core and
//! interprets its actions against a [`Transport`]: connect calls, teardown,
//! and backoff sleeps between reconnect attempts. Status transitions are
//! broadcast on a watch channel; the sync coordinator subscribes to trigger
//! drains when connectivity returns.
//!
//! The monitor never reconnects forever: the machine caps the attempt
//! sequence, settles in `Disconnected`, and reports a `connection_lost`
//! record. Further reconnection is an explicit caller action.

use crate::transport::Transport;
use keel_core::{Action, Event, MonitorConfig, MonitorEvent, MonitorState};
use keel_types::{
    timestamp_ms, ConnectionInfo, ConnectionStatus, ErrorKind, ErrorRecord, Severity,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

struct MonitorInner {
    machine: MonitorState,
    last_transition_at_ms: u64,
}

/// Tracks transport connectivity as an explicit state machine.
pub struct ConnectionMonitor<T: Transport> {
    transport: Arc<T>,
    inner: Arc<Mutex<MonitorInner>>,
    cfg: MonitorConfig,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl<T: Transport> ConnectionMonitor<T> {
    /// Create a monitor over a transport. Starts `Disconnected`.
    pub fn new(transport: Arc<T>, cfg: MonitorConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            transport,
            inner: Arc::new(Mutex::new(MonitorInner {
                machine: MonitorState::new(),
                last_transition_at_ms: timestamp_ms(),
            })),
            cfg,
            status_tx,
        }
    }

    /// Connect, driving the bounded reconnect sequence on failure.
    ///
    /// Returns `Ok` once `Connected`; returns the machine's
    /// `connection_lost` record if the reconnect budget is exhausted.
    /// A concurrent call while a sequence is already in flight is a no-op.
    pub async fn connect(&self) -> Result<(), ErrorRecord> {
        let actions = self.apply(Event::ConnectRequested).await;
        self.drive(actions).await
    }

    /// One immediate reconnect attempt, bypassing the backoff sequence.
    ///
    /// Fails fast with a `websocket_error` record if the transport adapter
    /// itself rejects.
    pub async fn force_reconnect(&self) -> Result<(), ErrorRecord> {
        let _ = self.apply(Event::DisconnectRequested).await;
        let _ = self.transport.disconnect().await;
        let _ = self.apply(Event::ConnectRequested).await;
        match self.transport.connect().await {
            Ok(()) => {
                let _ = self.apply(Event::ConnectSucceeded).await;
                Ok(())
            }
            Err(error) => {
                let _ = self.apply(Event::DisconnectRequested).await;
                Err(ErrorRecord::new(
                    ErrorKind::WebsocketError,
                    Severity::High,
                    error.to_string(),
                )
                .with_context("source", "force_reconnect"))
            }
        }
    }

    /// Host went offline (lifecycle event or transport-level loss).
    ///
    /// Starts the bounded reconnect sequence and awaits its outcome.
    pub async fn notify_offline(&self, reason: &str) -> Result<(), ErrorRecord> {
        let actions = self
            .apply(Event::ConnectionLost {
                reason: reason.to_string(),
            })
            .await;
        self.drive(actions).await
    }

    /// Host came back online; connect if currently disconnected.
    pub async fn notify_online(&self) -> Result<(), ErrorRecord> {
        let disconnected = {
            let inner = self.inner.lock().await;
            inner.machine.status() == ConnectionStatus::Disconnected
        };
        if disconnected {
            self.connect().await
        } else {
            Ok(())
        }
    }

    /// A heartbeat/ack window elapsed without a response.
    pub async fn heartbeat_missed(&self) {
        let actions = self.apply(Event::HeartbeatMissed).await;
        let _ = self.drive(actions).await;
    }

    /// Heartbeats resumed.
    pub async fn heartbeat_recovered(&self) {
        let actions = self.apply(Event::HeartbeatRecovered).await;
        let _ = self.drive(actions).await;
    }

    /// Read-only snapshot of the current state. A copy, not a live handle.
    pub async fn connection_info(&self) -> ConnectionInfo {
        let inner = self.inner.lock().await;
        ConnectionInfo {
            status: inner.machine.status(),
            reconnect_attempts: inner.machine.reconnect_attempts(),
            last_transition_at_ms: inner.last_transition_at_ms,
        }
    }

    /// Whether the machine considers the transport usable.
    pub async fn is_connected(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.machine.is_connected()
    }

    /// Subscribe to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Disconnect and settle in `Disconnected`.
    pub async fn close(&self) {
        let actions = self.apply(Event::DisconnectRequested).await;
        let _ = self.drive(actions).await;
    }

    /// Feed one event to the machine; publish the status if it changed.
    async fn apply(&self, event: Event) -> Vec<Action> {
        let mut inner = self.inner.lock().await;
        let old_status = inner.machine.status();
        let (next, actions) = inner.machine.clone().on_event(event, &self.cfg);
        inner.machine = next;
        let new_status = inner.machine.status();
        if new_status != old_status {
            inner.last_transition_at_ms = timestamp_ms();
            self.status_tx.send_replace(new_status);
        }
        actions
    }

    /// Interpret machine actions until the queue runs dry.
    ///
    /// Backoff sleeps happen inline, so the caller awaits the whole bounded
    /// sequence. No lock is held across an await.
    async fn drive(&self, actions: Vec<Action>) -> Result<(), ErrorRecord> {
        let mut queue: VecDeque<Action> = actions.into();
        let mut exhausted = None;
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Connect => {
                    let event = match self.transport.connect().await {
                        Ok(()) => Event::ConnectSucceeded,
                        Err(error) => Event::ConnectFailed {
                            error: error.to_string(),
                        },
                    };
                    queue.extend(self.apply(event).await);
                }
                Action::StartReconnectTimer { delay } => {
                    debug!(delay_ms = delay.as_millis() as u64, "backing off before reconnect");
                    tokio::time::sleep(delay).await;
                    queue.extend(self.apply(Event::ReconnectTimer).await);
                }
                Action::Disconnect => {
                    let _ = self.transport.disconnect().await;
                }
                Action::CancelReconnect => {
                    // Timers in this interpreter live on the action queue;
                    // reaching this action means the sequence already ended.
                }
                Action::Emit(MonitorEvent::ReconnectExhausted { record }) => {
                    warn!(%record, "reconnect budget exhausted");
                    exhausted = Some(record);
                }
                Action::Emit(event) => log_event(event),
            }
        }
        match exhausted {
            Some(record) => Err(record),
            None => Ok(()),
        }
    }
}

fn log_event(event: MonitorEvent) {
    match event {
        MonitorEvent::Connected => info!("transport connected"),
        MonitorEvent::Degraded => warn!("connection degraded, heartbeats missed"),
        MonitorEvent::Recovered => info!("connection recovered"),
        MonitorEvent::Disconnected { reason } => info!(%reason, "disconnected"),
        MonitorEvent::ReconnectFailed { attempt, error } => {
            warn!(attempt, %error, "reconnect attempt failed")
        }
        MonitorEvent::ReconnectExhausted { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::time::Duration;

    fn fast_cfg(cap: u32) -> MonitorConfig {
        MonitorConfig {
            max_reconnect_attempts: cap,
            reconnect_base_delay: Duration::from_millis(1),
            jitter: false,
        }
    }

    fn monitor(cap: u32) -> (ConnectionMonitor<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        let monitor = ConnectionMonitor::new(Arc::new(transport.clone()), fast_cfg(cap));
        (monitor, transport)
    }

    #[tokio::test]
    async fn successful_connect_reaches_connected() {
        let (monitor, transport) = monitor(3);

        monitor.connect().await.unwrap();

        let info = monitor.connection_info().await;
        assert_eq!(info.status, ConnectionStatus::Connected);
        assert_eq!(info.reconnect_attempts, 0);
        assert_eq!(transport.connect_calls(), 1);
        assert!(monitor.is_connected().await);
    }

    #[tokio::test]
    async fn retries_through_transient_connect_failures() {
        let (monitor, transport) = monitor(5);
        transport.fail_connects(2, "refused");

        monitor.connect().await.unwrap();

        assert_eq!(transport.connect_calls(), 3);
        let info = monitor.connection_info().await;
        assert_eq!(info.status, ConnectionStatus::Connected);
        assert_eq!(info.reconnect_attempts, 0);
    }

    #[tokio::test]
    async fn settles_disconnected_after_cap_with_cap_attempts() {
        let cap = 3;
        let (monitor, transport) = monitor(cap);
        transport.fail_connects(10, "network unreachable");

        let err = monitor.connect().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionLost);
        assert_eq!(err.severity, Severity::High);

        let info = monitor.connection_info().await;
        assert_eq!(info.status, ConnectionStatus::Disconnected);
        assert_eq!(info.reconnect_attempts, cap);
        assert_eq!(transport.connect_calls(), cap);
    }

    #[tokio::test]
    async fn connection_loss_recovers_automatically() {
        let (monitor, transport) = monitor(5);
        monitor.connect().await.unwrap();

        transport.drop_connection();
        monitor.notify_offline("socket closed").await.unwrap();

        assert!(monitor.is_connected().await);
        assert_eq!(transport.connect_calls(), 2);
    }

    #[tokio::test]
    async fn heartbeat_degrades_and_recovers() {
        let (monitor, _transport) = monitor(3);
        monitor.connect().await.unwrap();

        monitor.heartbeat_missed().await;
        assert_eq!(
            monitor.connection_info().await.status,
            ConnectionStatus::Degraded
        );
        // Degraded still counts as usable.
        assert!(monitor.is_connected().await);

        monitor.heartbeat_recovered().await;
        assert_eq!(
            monitor.connection_info().await.status,
            ConnectionStatus::Connected
        );
    }

    #[tokio::test]
    async fn force_reconnect_fails_fast_with_websocket_record() {
        let (monitor, transport) = monitor(5);
        monitor.connect().await.unwrap();
        let calls_before = transport.connect_calls();

        transport.fail_next_connect("adapter rejected");
        let err = monitor.force_reconnect().await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::WebsocketError);
        // Exactly one attempt, no backoff sequence.
        assert_eq!(transport.connect_calls(), calls_before + 1);
        assert_eq!(
            monitor.connection_info().await.status,
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn force_reconnect_success_reaches_connected() {
        let (monitor, _transport) = monitor(5);
        monitor.connect().await.unwrap();

        monitor.force_reconnect().await.unwrap();
        assert_eq!(
            monitor.connection_info().await.status,
            ConnectionStatus::Connected
        );
    }

    #[tokio::test]
    async fn status_transitions_are_broadcast() {
        let (monitor, _transport) = monitor(3);
        let rx = monitor.subscribe();
        assert_eq!(*rx.borrow(), ConnectionStatus::Disconnected);

        monitor.connect().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionStatus::Connected);

        monitor.close().await;
        assert_eq!(*rx.borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn notify_online_connects_only_when_disconnected() {
        let (monitor, transport) = monitor(3);

        monitor.notify_online().await.unwrap();
        assert_eq!(transport.connect_calls(), 1);

        // Already connected: a second online signal is a no-op.
        monitor.notify_online().await.unwrap();
        assert_eq!(transport.connect_calls(), 1);
    }
}
