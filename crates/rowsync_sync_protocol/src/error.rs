//! Error types for the sync protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An offset string was not `-1` or a log position.
    #[error("invalid offset: {0:?}")]
    InvalidOffset(String),

    /// A transaction identifier was not a decimal integer.
    #[error("invalid transaction id: {0:?}")]
    InvalidTransactionId(String),

    /// A subscription parameter had an unusable value.
    #[error("invalid value {value:?} for parameter {name}")]
    InvalidParam {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: String,
    },
}

impl ProtocolError {
    /// Creates an invalid parameter error.
    pub fn invalid_param(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            value: value.into(),
        }
    }
}
