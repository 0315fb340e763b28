//! Bounded retry with backoff and per-key single-flight.
//!
//! [`RetryExecutor`] wraps an async operation in a retry session: attempt,
//! classify-driven retry decision, backoff sleep, attempt again, up to the
//! policy's cap. Sessions are keyed; two concurrent calls with the same key
//! share one underlying session instead of racing, which is what makes
//! "retry this save" buttons safe to mash.
//!
//! Sharing is implemented with a [`Shared`] boxed future: the second caller
//! awaits a clone of the first session's future and receives a clone of its
//! outcome. A session has no external cancellation - it runs to success or
//! exhaustion - but dropping one caller does not abort it for the others.

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use keel_core::backoff::retry_delay;
use keel_types::{ErrorRecord, RetryPolicy};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

type SessionFuture<T> = Shared<BoxFuture<'static, Result<T, ErrorRecord>>>;

/// Retry executor with per-key single-flight sessions.
///
/// Cheap to clone; clones share the session table.
pub struct RetryExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    sessions: Arc<Mutex<HashMap<String, SessionFuture<T>>>>,
}

impl<T> RetryExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new executor with an empty session table.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `op` under the policy, joining an in-flight session for `key`
    /// if one exists.
    ///
    /// `op` is invoked once per attempt. Only retryable error kinds are
    /// retried; validation and business failures are returned after the
    /// first attempt. On exhaustion the last [`ErrorRecord`] is returned
    /// with the attempt count attached to its context.
    pub async fn execute<F, Fut>(
        &self,
        key: &str,
        policy: RetryPolicy,
        op: F,
    ) -> Result<T, ErrorRecord>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ErrorRecord>> + Send + 'static,
    {
        let session = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let table = Arc::clone(&self.sessions);
                    let session_key = key.to_string();
                    let session = async move {
                        let result = run_session(policy, op).await;
                        // The entry must go away on every exit path, or the
                        // key would replay a finished session forever.
                        table.lock().await.remove(&session_key);
                        result
                    }
                    .boxed()
                    .shared();
                    sessions.insert(key.to_string(), session.clone());
                    session
                }
            }
        };
        session.await
    }

    /// Whether a session is currently in flight for `key`.
    pub async fn in_flight(&self, key: &str) -> bool {
        self.sessions.lock().await.contains_key(key)
    }
}

impl<T> Default for RetryExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RetryExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
        }
    }
}

async fn run_session<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ErrorRecord>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ErrorRecord>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(record) => {
                if !record.kind.is_retryable() || attempt >= max_attempts {
                    return Err(record.with_context("attempts", attempt));
                }
                let delay = retry_delay(&policy, attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = %record.kind,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
