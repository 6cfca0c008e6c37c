//! Error types for mailstack-harness

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Container not ready: expected {sentinel:?} in the log within {elapsed:?}")]
    ReadinessTimeout { sentinel: String, elapsed: Duration },

    #[error("Container {container} did not exit within {timeout:?}")]
    ExitTimeout { container: String, timeout: Duration },

    #[error("Container {container} did not exit cleanly: exit code {code}")]
    ExitCode { container: String, code: i64 },

    #[error("{command} failed: expected {expected}, got {actual}")]
    Protocol {
        command: String,
        expected: String,
        actual: String,
    },

    #[error("Login rejected for {user:?}: {reason}")]
    Auth { user: String, reason: String },

    #[error(
        "Version mismatch on {witness} witness: expected {expected:?}, got {actual:?} ({witnesses})"
    )]
    VersionMismatch {
        witness: String,
        expected: String,
        actual: String,
        witnesses: String,
    },

    #[error("Composition error: {0}")]
    Composition(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Message {token} was not delivered to {recipient} within {timeout:?}")]
    DeliveryTimeout {
        token: String,
        recipient: String,
        timeout: Duration,
    },

    #[error("Check failed: {0}")]
    Assertion(String),

    #[error("Version file error: {0}")]
    VersionFile(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::Protocol`] from the offending command and the
    /// status the server actually returned.
    pub(crate) fn protocol(
        command: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Protocol {
            command: command.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether this is a rejected login.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
