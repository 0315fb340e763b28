//! Recovery supervisor for otherwise-fatal failures.
//!
//! [`RecoverySupervisor`] wraps a region of the application (a render call,
//! a module load) and absorbs failures that would otherwise tear it down.
//! Each failure is classified; the supervisor then transitions to one of two
//! recovery states instead of propagating:
//!
//! - `chunk_load`: the running code is stale relative to the deployed
//!   assets. The supervisor enters `Updating` and schedules exactly one
//!   delayed reload, leaving time for an in-flight retry elsewhere to
//!   resolve first. If the region recovers before the timer fires, the
//!   reload is a no-op.
//! - anything else: the supervisor enters `Failed` with the record, and the
//!   caller offers "try again" ([`reset`](RecoverySupervisor::reset)) and
//!   "reload" ([`reload_now`](RecoverySupervisor::reload_now)) actions.
//!
//! The supervisor never propagates from its own failure path.

use crate::task::{schedule, TaskHandle};
use keel_core::classify::{classify, RawFailure};
use keel_types::{ErrorKind, ErrorRecord};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Recovery behavior knobs.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Delay before the scheduled reload after a stale-asset failure.
    pub reload_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reload_delay: Duration::from_secs(10),
        }
    }
}

/// What the supervised region should currently show.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RecoveryState {
    /// Healthy; render the region normally.
    #[default]
    Idle,
    /// Stale-asset failure absorbed; a reload is scheduled.
    Updating {
        /// The absorbed failure.
        record: ErrorRecord,
    },
    /// A generic failure was absorbed; offer retry and reload actions.
    Failed {
        /// The absorbed failure.
        record: ErrorRecord,
    },
}

type ReloadFn = Arc<dyn Fn() + Send + Sync>;

/// Supervises a failure-prone region and owns its recovery timer.
pub struct RecoverySupervisor {
    cfg: SupervisorConfig,
    reload: ReloadFn,
    state_tx: watch::Sender<RecoveryState>,
    timer: Mutex<Option<TaskHandle>>,
}

impl RecoverySupervisor {
    /// Create a supervisor. `reload` is the full-reload escape hatch
    /// (process restart, page reload) supplied by the host.
    pub fn new<R>(cfg: SupervisorConfig, reload: R) -> Arc<Self>
    where
        R: Fn() + Send + Sync + 'static,
    {
        let (state_tx, _) = watch::channel(RecoveryState::Idle);
        Arc::new(Self {
            cfg,
            reload: Arc::new(reload),
            state_tx,
            timer: Mutex::new(None),
        })
    }

    /// Run a fallible call under the supervisor.
    ///
    /// On failure the record is absorbed into the recovery state and `None`
    /// is returned; nothing propagates.
    pub fn guard<T, F>(self: &Arc<Self>, f: F) -> Option<T>
    where
        F: FnOnce() -> Result<T, ErrorRecord>,
    {
        match f() {
            Ok(value) => Some(value),
            Err(record) => {
                self.capture(record);
                None
            }
        }
    }

    /// Classify a raw failure and absorb it. Returns the record for the
    /// caller's own reporting.
    pub fn absorb(self: &Arc<Self>, raw: Option<&RawFailure<'_>>) -> ErrorRecord {
        let record = classify(raw);
        self.capture(record.clone());
        record
    }

    /// Absorb an already-classified failure.
    pub fn capture(self: &Arc<Self>, record: ErrorRecord) {
        if record.kind == ErrorKind::ChunkLoad {
            info!(%record, "stale assets detected, scheduling reload");
            self.state_tx
                .send_replace(RecoveryState::Updating { record });
            self.schedule_reload();
        } else {
            warn!(%record, "failure absorbed by recovery supervisor");
            self.state_tx.send_replace(RecoveryState::Failed { record });
        }
    }

    /// "Try again": clear the failure state without a reload.
    ///
    /// Cancels any pending reload timer, so a region that recovered in time
    /// is never reloaded out from under itself.
    pub fn reset(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.cancel();
        }
        self.state_tx.send_replace(RecoveryState::Idle);
    }

    /// Immediate full reload, bypassing the delay.
    pub fn reload_now(&self) {
        (self.reload)();
    }

    /// Current recovery state snapshot.
    pub fn state(&self) -> RecoveryState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to recovery state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RecoveryState> {
        self.state_tx.subscribe()
    }

    fn schedule_reload(self: &Arc<Self>) {
        // Weak, so the timer never keeps a torn-down supervisor alive.
        let supervisor: Weak<Self> = Arc::downgrade(self);
        let handle = schedule(self.cfg.reload_delay, async move {
            if let Some(supervisor) = supervisor.upgrade() {
                supervisor.fire_reload();
            }
        });
        // Replacing the handle aborts any previously scheduled reload, so
        // at most one timer is ever pending.
        *lock(&self.timer) = Some(handle);
    }

    fn fire_reload(&self) {
        let still_updating = matches!(&*self.state_tx.borrow(), RecoveryState::Updating { .. });
        if still_updating {
            info!("reload timer fired, reloading");
            (self.reload)();
        } else {
            debug!("reload timer fired after recovery, ignoring");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::Severity;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_cfg() -> SupervisorConfig {
        SupervisorConfig {
            reload_delay: Duration::from_millis(20),
        }
    }

    fn counting_supervisor() -> (Arc<RecoverySupervisor>, Arc<AtomicU32>) {
        let reloads = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&reloads);
        let supervisor = RecoverySupervisor::new(fast_cfg(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (supervisor, reloads)
    }

    fn chunk_failure() -> ErrorRecord {
        ErrorRecord::new(
            ErrorKind::ChunkLoad,
            Severity::High,
            "Failed to fetch dynamically imported module: /assets/app.js",
        )
    }

    #[tokio::test]
    async fn chunk_load_enters_updating_and_reloads_after_delay() {
        let (supervisor, reloads) = counting_supervisor();

        let record = supervisor.absorb(Some(&RawFailure::message(
            "Failed to fetch dynamically imported module: /assets/app.js",
        )));
        assert_eq!(record.kind, ErrorKind::ChunkLoad);
        assert!(matches!(supervisor.state(), RecoveryState::Updating { .. }));
        assert_eq!(reloads.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_before_timer_prevents_reload() {
        let (supervisor, reloads) = counting_supervisor();

        supervisor.capture(chunk_failure());
        supervisor.reset();
        assert_eq!(supervisor.state(), RecoveryState::Idle);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_chunk_failures_schedule_at_most_one_reload() {
        let (supervisor, reloads) = counting_supervisor();

        supervisor.capture(chunk_failure());
        supervisor.capture(chunk_failure());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generic_failure_enters_failed_without_reload() {
        let (supervisor, reloads) = counting_supervisor();

        let record = supervisor.absorb(Some(
            &RawFailure::message("something exploded").named("RenderError"),
        ));
        assert_eq!(record.kind, ErrorKind::System);
        assert!(matches!(supervisor.state(), RecoveryState::Failed { .. }));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reset_clears_failed_state_for_retry() {
        let (supervisor, _reloads) = counting_supervisor();

        supervisor.guard(|| Err::<(), _>(ErrorRecord::new(
            ErrorKind::Unknown,
            Severity::Medium,
            "oops",
        )));
        assert!(matches!(supervisor.state(), RecoveryState::Failed { .. }));

        supervisor.reset();
        assert_eq!(supervisor.state(), RecoveryState::Idle);
        assert_eq!(supervisor.guard(|| Ok::<_, ErrorRecord>(5)), Some(5));
    }

    #[tokio::test]
    async fn guard_passes_success_through_untouched() {
        let (supervisor, _reloads) = counting_supervisor();
        assert_eq!(supervisor.guard(|| Ok::<_, ErrorRecord>("fine")), Some("fine"));
        assert_eq!(supervisor.state(), RecoveryState::Idle);
    }

    #[tokio::test]
    async fn reload_now_is_an_immediate_escape_hatch() {
        let (supervisor, reloads) = counting_supervisor();
        supervisor.reload_now();
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_the_supervisor_cancels_the_pending_reload() {
        let (supervisor, reloads) = counting_supervisor();
        supervisor.capture(chunk_failure());
        drop(supervisor);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(reloads.load(Ordering::SeqCst), 0);
    }
}
