//! Transfer error type.

use crate::sftp::types::TransferPhase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised transfer error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferError {
    pub kind: TransferErrorKind,
    pub message: String,
    /// State-machine phase that was running when the error happened.
    pub phase: Option<TransferPhase>,
    /// File the error is attributed to, if any.
    pub file: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferErrorKind {
    /// Socket, handshake, host-key or authentication failure. Fatal to the batch.
    Connection,
    /// Missing source directory, file or path-list entry.
    NotFound,
    /// Destination exists and the conflict action is Error.
    Conflict,
    /// Rename / move / delete / read / write on an endpoint failed.
    Operation,
    /// Timeout or external cancellation.
    Cancelled,
    /// Caller error detected before any I/O (bad macro use, bad config).
    InvalidInput,
    /// Aggregate raised at the batch boundary when `throw_error_on_fail` is set.
    BatchFailed,
    /// Catch-all.
    Unknown,
}

pub type TransferResult<T> = Result<T, TransferError>;

// ── Construction helpers ─────────────────────────────────────────────

impl TransferError {
    pub fn new(kind: TransferErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            phase: None,
            file: None,
        }
    }

    pub fn with_phase(mut self, phase: TransferPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Connection, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::NotFound, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Conflict, msg)
    }

    pub fn operation(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Operation, msg)
    }

    pub fn cancelled() -> Self {
        Self::new(TransferErrorKind::Cancelled, "The operation was canceled.")
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::InvalidInput, msg)
    }

    pub fn batch_failed(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::BatchFailed, msg)
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Unknown, msg)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == TransferErrorKind::NotFound
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == TransferErrorKind::Cancelled
    }

    /// Prefix the message with context, keeping kind and attribution.
    pub fn context(mut self, ctx: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", ctx, self.message);
        self
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Some(phase) => write!(f, "[{:?} in {}] {}", self.kind, phase, self.message),
            None => write!(f, "[{:?}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(e.to_string()),
            std::io::ErrorKind::TimedOut => Self::operation(format!("I/O timeout: {}", e)),
            std::io::ErrorKind::Interrupted => Self::cancelled(),
            _ => Self::operation(e.to_string()),
        }
    }
}

/// libssh2 SFTP status code for "no such file".
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;

impl From<ssh2::Error> for TransferError {
    fn from(e: ssh2::Error) -> Self {
        match e.code() {
            ssh2::ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE) => Self::not_found(e.to_string()),
            ssh2::ErrorCode::SFTP(_) => Self::operation(e.to_string()),
            ssh2::ErrorCode::Session(_) => Self::connection(e.to_string()),
        }
    }
}

impl From<TransferError> for String {
    fn from(e: TransferError) -> String {
        e.message
    }
}
