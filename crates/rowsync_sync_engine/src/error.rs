//! Error types for the sync engine.

use rowsync_sync_protocol::{ErrorKind, ProtocolError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing a collection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a structured error.
    #[error("rejected ({kind}): {message}")]
    Rejected {
        /// Error category reported by the server.
        kind: ErrorKind,
        /// Server message.
        message: String,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An earlier mutation on the same row was rejected.
    #[error("an earlier mutation on row {key} was rejected")]
    DependencyRejected {
        /// Local key of the row.
        key: String,
    },

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The collection was closed.
    #[error("collection is closed")]
    Closed,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a rejection.
    pub fn rejected(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Rejected {
            kind,
            message: message.into(),
        }
    }

    /// Returns the server error category, if the server rejected the request.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SyncError::Rejected { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Rejected { kind, .. } => {
                matches!(kind, ErrorKind::Upstream | ErrorKind::Internal)
            }
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("invalid header").is_retryable());
        assert!(SyncError::rejected(ErrorKind::Upstream, "feed down").is_retryable());
        assert!(!SyncError::rejected(ErrorKind::AccessDenied, "not yours").is_retryable());
        assert!(!SyncError::Closed.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::rejected(ErrorKind::NotFound, "todos 3 not found");
        assert_eq!(err.to_string(), "rejected (not_found): todos 3 not found");
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert_eq!(SyncError::Closed.to_string(), "collection is closed");
    }
}
