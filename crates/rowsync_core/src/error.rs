//! Error types for rowsync core.

use crate::shape::ValidationError;
use rowsync_sync_protocol::{ProtocolError, RowKey};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in rowsync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Payload or identity failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Wire encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An insert supplied an identity value that already exists.
    #[error("duplicate key {key} in table {table}")]
    DuplicateKey {
        /// Table written to.
        table: String,
        /// The conflicting identity value.
        key: RowKey,
    },

    /// Transaction was aborted.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// Descriptor configuration is inconsistent.
    #[error("invalid descriptor: {message}")]
    InvalidDescriptor {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The change-feed service failed.
    #[error("upstream error: {message}")]
    Upstream {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an invalid descriptor error.
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Returns true if the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_) | CoreError::DuplicateKey { .. }
        )
    }
}
