//! Error types used by the cohort runtime.
//!
//! Four enums, one per failure domain:
//!
//! - [`TaskError`] — failures raised by lifecycle handlers during bus dispatch.
//! - [`SyncError`] — failures of the cross-process start handshake.
//! - [`ConnectionError`] — failures of the authenticated connection channel.
//! - [`ProcessError`] — the only errors surfaced from [`Process::run`](crate::Process::run).
//!
//! Handler failures never cross the `publish` boundary: the bus catches them,
//! logs them, and keeps dispatching. Only handshake failures and I/O during
//! process startup propagate to the caller.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// # Errors raised by lifecycle handlers.
///
/// Dispatch isolates these per subscriber: a failing handler is logged and the
/// remaining subscribers still run.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Handler returned an application-level failure.
    #[error("task failed: {error}")]
    Fail {
        /// Human-readable failure description.
        error: String,
    },

    /// Handler panicked during dispatch; the panic was caught by the bus.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Extracted panic payload, or `"unknown panic"`.
        info: String,
    },

    /// I/O failure inside a handler.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TaskError {
    /// Convenience constructor for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_fail",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Io(_) => "task_io",
        }
    }
}

/// # Errors raised by the fan-out start handshake.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SyncError {
    /// A bounded wait elapsed before the parent released the cohort.
    ///
    /// Only produced when the waiter was built with an explicit timeout;
    /// the default wait is unbounded, matching the base design.
    #[error("handshake timed out after {timeout:?}")]
    HandshakeTimeout {
        /// The configured bound that elapsed.
        timeout: Duration,
    },

    /// The rendezvous socket failed.
    #[error("handshake i/o error: {0}")]
    Io(#[from] io::Error),
}

impl SyncError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SyncError::HandshakeTimeout { .. } => "handshake_timeout",
            SyncError::Io(_) => "handshake_io",
        }
    }
}

/// # Errors raised by connection endpoints.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The client exhausted its bounded connect retries; permanent.
    #[error("gave up after {attempts} connection attempts")]
    Exhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The peer failed (or refused) the shared-secret challenge.
    #[error("authentication rejected")]
    AuthRejected,

    /// `send`/`recv` called before a connection was established.
    #[error("endpoint is not connected")]
    NotConnected,

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// Payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Transport-level I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectionError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectionError::Exhausted { .. } => "conn_exhausted",
            ConnectionError::AuthRejected => "conn_auth_rejected",
            ConnectionError::NotConnected => "conn_not_connected",
            ConnectionError::Closed => "conn_closed",
            ConnectionError::Codec(_) => "conn_codec",
            ConnectionError::Io(_) => "conn_io",
        }
    }
}

/// # Errors surfaced as process-level outcomes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The start handshake failed or timed out.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Process-level I/O failure (e.g. spawning a child).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
