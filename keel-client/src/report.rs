//! External error reporting.
//!
//! Classified records can be forwarded to an external collaborator (crash
//! reporter, analytics pipeline). The contract is strictly one-way: a
//! reporter that fails must never mask or replace the record it was handed,
//! so callers log and discard reporter failures.

use async_trait::async_trait;
use keel_types::ErrorRecord;
use thiserror::Error;
use tracing::debug;

/// Reporter-side failures. Never propagated past the reporting call.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The collaborator rejected or failed to accept the record.
    #[error("report rejected: {0}")]
    Rejected(String),
    /// The collaborator is unreachable.
    #[error("reporter unavailable: {0}")]
    Unavailable(String),
}

/// Sink for classified error records.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    /// Forward one record to the external collaborator.
    async fn report(&self, record: &ErrorRecord) -> Result<(), ReportError>;
}

/// Reporter that writes records to the log and nothing else.
#[derive(Debug, Default)]
pub struct LogReporter;

#[async_trait]
impl ErrorReporter for LogReporter {
    async fn report(&self, record: &ErrorRecord) -> Result<(), ReportError> {
        debug!(kind = %record.kind, severity = ?record.severity, message = %record.message, "error reported");
        Ok(())
    }
}
