//! Error taxonomy and retryability classification.
//!
//! Connection-layer errors are recovered locally (heartbeat + reconnect)
//! while a host is under active monitoring and surfaced to the HTTP layer
//! otherwise. Probe-layer partial failures never propagate past the
//! command runner; they degrade the snapshot silently.
//!
//! Retry classification follows a simple rule: authentication failures
//! indicate credential problems that will not resolve on their own and are
//! never retried (avoids account lockouts); transient network errors are.

use thiserror::Error;

/// Errors produced by the monitoring core.
///
/// `Clone` is required because a connect failure settles a shared
/// pending-connect future observed by every joined caller.
#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    /// Credential lookup or parse failure. Fatal to the specific request,
    /// never to the process.
    #[error("configuration error: {0}")]
    Config(String),

    /// Handshake failure or timeout.
    #[error("connection error: {0}")]
    Connect(String),

    /// Every probe on a session failed; the session must be torn down.
    #[error("session dead: {0}")]
    SessionDead(String),

    /// A single remote command failed or timed out. Defaulted away by the
    /// command runner, surfaced only when all probes fail at once.
    #[error("probe failed: {0}")]
    Probe(String),
}

/// Authentication error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "password authentication failed",
    "key authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "timed out",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
    "would block",
];

/// Determines if a handshake error is transient and worth retrying.
///
/// Authentication failures are checked first and take precedence: an error
/// mentioning both a timeout and failed authentication is not retried.
/// Unknown errors that don't look like SSH protocol errors are retried
/// conservatively.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    for auth_err in AUTH_ERRORS {
        if error_lower.contains(auth_err) {
            return false;
        }
    }

    for retryable_err in RETRYABLE_ERRORS {
        if error_lower.contains(retryable_err) {
            return true;
        }
    }

    !error_lower.contains("ssh")
        || error_lower.contains("timeout")
        || error_lower.contains("connect")
}
