//! Scheduled-task abstraction.
//!
//! Components that need "do this later" (delayed reload, reconnect timers)
//! schedule through here and hold the returned handle. Dropping or
//! cancelling the handle stops the timer, so a torn-down component can never
//! have a stale timer fire against it.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Cancellation handle for a scheduled action.
///
/// The handle owns the task: dropping it cancels the timer. Keep it alive
/// for as long as the action should remain scheduled.
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Cancel the scheduled action if it has not fired yet.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the action has already run (or been cancelled).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Run `action` after `delay`, unless cancelled first.
pub fn schedule<F>(delay: Duration, action: F) -> TaskHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    TaskHandle {
        handle: tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }),
    }
}
