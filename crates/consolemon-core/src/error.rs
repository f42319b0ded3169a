use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::session::SessionId;

/// Errors that stop an operation from running.
///
/// Per-session capture failures are absent: they are folded into
/// empty content by the poll engine and reported in the cycle report instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("enumeration failed: {0}")]
    EnumerationFailed(#[from] EnumerationError),

    #[error("precondition mismatch for pid {pid}: expected {expected}, actual {actual}")]
    PreconditionMismatch {
        pid: SessionId,
        expected: Fingerprint,
        actual: Fingerprint,
    },

    #[error("injection failed for pid {pid} after {delivered} action(s): {source}")]
    InjectionFailed {
        pid: SessionId,
        delivered: usize,
        #[source]
        source: InjectionError,
    },

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("timed out after {waited_ms}ms waiting for registry lock {path}")]
    LockTimeout { path: String, waited_ms: u64 },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Stable machine-readable kind, used by the command surface.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::EnumerationFailed(_) => "ENUMERATION_FAILED",
            MonitorError::PreconditionMismatch { .. } => "PRECONDITION_MISMATCH",
            MonitorError::InjectionFailed { .. } => "INJECTION_FAILED",
            MonitorError::InvalidAction(_) => "INVALID_ACTION",
            MonitorError::LockTimeout { .. } => "LOCK_TIMEOUT",
            MonitorError::Persistence(_) | MonitorError::Io(_) => "PERSISTENCE_FAILED",
            MonitorError::Config(_) => "CONFIG",
        }
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;

/// The enumeration service could not produce a session list for this cycle.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("tool exited with {code:?}: {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },

    #[error("tool timed out after {0}s")]
    Timeout(u64),

    #[error("malformed session list: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// A single session's text could not be captured.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture produced for pid {0}")]
    NoOutput(SessionId),

    #[error("capture timed out after {0}s")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// The session's window could not be brought to the foreground.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("tool exited with {code:?}: {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },

    #[error("activation timed out after {0}s")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// An input action could not be delivered.
#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("tool exited with {code:?}: {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },

    #[error("injection timed out after {0}s")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
