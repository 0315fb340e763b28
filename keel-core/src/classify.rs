//! Error classification.
//!
//! [`classify`] turns whatever a caller managed to catch into a well-formed
//! [`ErrorRecord`]. It is total: any input, including no input at all,
//! produces a record. It never panics.
//!
//! Rules are evaluated in order; the first match wins. The ordering matters:
//! chunk-load failures also look like fetch failures, and socket failures
//! also look like network failures, so the more specific rules come first.

use keel_types::{ErrorKind, ErrorRecord, Severity};
use serde_json::{Map, Value};

/// Caller-supplied category tag for failures the layer cannot infer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTag {
    /// Structural/input validation failure.
    Validation,
    /// Domain rule violation.
    Business,
}

/// Which transport primitive the failure came out of, when the caller knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHint {
    /// A socket-based transport.
    Websocket,
    /// An HTTP fetch primitive.
    Fetch,
}

/// The raw material of a caught failure.
///
/// Built with the fluent helpers; only `message` is required:
///
/// ```
/// use keel_core::classify::{RawFailure, TransportHint};
///
/// let raw = RawFailure::message("connection reset")
///     .via(TransportHint::Websocket);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFailure<'a> {
    /// The failure's declared type name, if it had one.
    pub name: Option<&'a str>,
    /// The failure message. May be empty.
    pub message: &'a str,
    /// Caller-supplied category tag.
    pub tag: Option<FailureTag>,
    /// Transport the failure came out of.
    pub transport: Option<TransportHint>,
    /// The transport primitive itself is absent in this environment.
    pub capability_missing: bool,
}

impl<'a> RawFailure<'a> {
    /// A failure known only by its message.
    pub fn message(message: &'a str) -> Self {
        Self {
            message,
            ..Self::default()
        }
    }

    /// Attach the failure's declared type name.
    pub fn named(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    /// Attach a caller category tag.
    pub fn tagged(mut self, tag: FailureTag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Record which transport the failure came out of.
    pub fn via(mut self, transport: TransportHint) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Mark the transport primitive as absent in this environment.
    pub fn capability_missing(mut self) -> Self {
        self.capability_missing = true;
        self
    }
}

const CHUNK_PATTERNS: &[&str] = &[
    "failed to fetch dynamically imported module",
    "loading chunk",
    "loading css chunk",
    "importing a module script failed",
];

const CHUNK_ERROR_NAME: &str = "ChunkLoadError";

const SOCKET_PATTERNS: &[&str] = &["websocket", "socket closed", "socket hang up", "1006"];

const CONNECTION_PATTERNS: &[&str] = &[
    "failed to fetch",
    "networkerror when attempting to fetch",
    "connection refused",
    "connection reset",
    "dns",
    "err_internet_disconnected",
];

const NETWORK_PATTERNS: &[&str] = &["timeout", "timed out", "network error", "network request failed"];

const VALIDATION_PATTERNS: &[&str] = &["validation", "invalid input", "is required", "must be"];

/// Classify a caught failure. Never panics.
///
/// `None` deliberately maps to `unknown`/`medium` instead of being rejected:
/// callers hand the classifier whatever they caught, and a classifier that
/// can itself fail defeats its purpose.
pub fn classify(raw: Option<&RawFailure<'_>>) -> ErrorRecord {
    classify_with_context(raw, Map::new())
}

/// Classify with caller-supplied context attached to the record.
pub fn classify_with_context(raw: Option<&RawFailure<'_>>, context: Map<String, Value>) -> ErrorRecord {
    let Some(raw) = raw else {
        return ErrorRecord::new(ErrorKind::Unknown, Severity::Medium, "unknown error")
            .with_context_map(context);
    };

    let kind = kind_of(raw);
    let message = if raw.message.is_empty() {
        "unknown error".to_string()
    } else {
        raw.message.to_string()
    };
    ErrorRecord::new(kind, severity_for(kind), message).with_context_map(context)
}

/// Default severity per kind.
pub fn severity_for(kind: ErrorKind) -> Severity {
    match kind {
        ErrorKind::Network => Severity::Medium,
        ErrorKind::ConnectionLost => Severity::High,
        ErrorKind::WebsocketError => Severity::High,
        ErrorKind::Validation => Severity::Low,
        ErrorKind::Business => Severity::Medium,
        ErrorKind::System => Severity::High,
        ErrorKind::ChunkLoad => Severity::High,
        ErrorKind::Unknown => Severity::Medium,
    }
}

fn kind_of(raw: &RawFailure<'_>) -> ErrorKind {
    let msg = raw.message.to_lowercase();

    // Chunk-load failures first: they also match the generic fetch patterns.
    if raw.name == Some(CHUNK_ERROR_NAME) || matches_any(&msg, CHUNK_PATTERNS) {
        return ErrorKind::ChunkLoad;
    }

    // Socket failures: the transport says so, or the message does.
    let via_socket = raw.transport == Some(TransportHint::Websocket);
    if (via_socket && (raw.capability_missing || matches_any(&msg, SOCKET_PATTERNS)))
        || matches_any(&msg, &["websocket"])
    {
        return ErrorKind::WebsocketError;
    }

    // Network-level: a rejected/absent fetch means the path is gone;
    // a timeout means the path is merely slow or flaky.
    let via_fetch = raw.transport == Some(TransportHint::Fetch);
    if (via_fetch && raw.capability_missing) || matches_any(&msg, CONNECTION_PATTERNS) {
        return ErrorKind::ConnectionLost;
    }
    if matches_any(&msg, NETWORK_PATTERNS) {
        return ErrorKind::Network;
    }

    match raw.tag {
        Some(FailureTag::Validation) => return ErrorKind::Validation,
        Some(FailureTag::Business) => return ErrorKind::Business,
        None => {}
    }
    if matches_any(&msg, VALIDATION_PATTERNS) {
        return ErrorKind::Validation;
    }

    // A declared type name is a recognizable origin.
    if raw.name.is_some() {
        return ErrorKind::System;
    }

    ErrorKind::Unknown
}

fn matches_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}
