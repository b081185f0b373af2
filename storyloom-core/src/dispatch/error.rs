//! Dispatch error types.

use std::fmt;
use thiserror::Error;

/// Transport-level signals worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    Unavailable,
    ConnectionReset,
    ConnectionRefused,
    TimedOut,
}

/// Failures that retrying cannot fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermanentKind {
    Validation,
    NotFound,
    Rejected,
    Protocol,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientKind::Unavailable => write!(f, "unavailable"),
            TransientKind::ConnectionReset => write!(f, "connection reset"),
            TransientKind::ConnectionRefused => write!(f, "connection refused"),
            TransientKind::TimedOut => write!(f, "timed out"),
        }
    }
}

impl fmt::Display for PermanentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermanentKind::Validation => write!(f, "validation"),
            PermanentKind::NotFound => write!(f, "not found"),
            PermanentKind::Rejected => write!(f, "rejected"),
            PermanentKind::Protocol => write!(f, "protocol"),
        }
    }
}

/// A single failed call to the orchestrator, already classified.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Orchestrator {kind}: {message}")]
    Transient {
        kind: TransientKind,
        message: String,
    },

    #[error("Orchestrator {kind} error: {message}")]
    Permanent {
        kind: PermanentKind,
        message: String,
    },
}

impl OrchestratorError {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        OrchestratorError::Transient {
            kind,
            message: message.into(),
        }
    }

    pub fn permanent(kind: PermanentKind, message: impl Into<String>) -> Self {
        OrchestratorError::Permanent {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, OrchestratorError::Transient { .. })
    }
}

/// Error surfaced to the caller of a dispatch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("{operation} failed on attempt {attempt}: {source}")]
    Permanent {
        operation: &'static str,
        attempt: u32,
        #[source]
        source: OrchestratorError,
    },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: OrchestratorError,
    },
}

impl DispatchError {
    pub fn attempts(&self) -> u32 {
        match self {
            DispatchError::Permanent { attempt, .. } => *attempt,
            DispatchError::RetriesExhausted { attempts, .. } => *attempts,
        }
    }
}
