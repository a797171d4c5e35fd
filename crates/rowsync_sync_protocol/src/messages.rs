//! Mutation responses and structured error bodies.

use crate::types::{Row, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Successful response of a create, update or delete call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    /// Transaction that committed the write.
    pub transaction_id: TransactionId,
    /// The written row (the removed row for deletes).
    pub item: Row,
}

impl MutationResponse {
    /// Creates a new mutation response.
    pub fn new(transaction_id: TransactionId, item: Row) -> Self {
        Self {
            transaction_id,
            item,
        }
    }
}

/// Machine-readable category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No session could be resolved for the request.
    Unauthenticated,
    /// An access predicate denied the operation.
    AccessDenied,
    /// The payload or identity failed validation.
    Validation,
    /// The write matched no row.
    NotFound,
    /// The request itself was malformed.
    BadRequest,
    /// The upstream change-feed service failed.
    Upstream,
    /// Unexpected server failure.
    Internal,
}

impl ErrorKind {
    /// Returns the HTTP status code for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Unauthenticated => 401,
            ErrorKind::AccessDenied => 403,
            ErrorKind::Validation => 422,
            ErrorKind::NotFound => 404,
            ErrorKind::BadRequest => 400,
            ErrorKind::Upstream => 502,
            ErrorKind::Internal => 500,
        }
    }

    /// Maps a status code back to a kind, for bodies that could not be decoded.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Unauthenticated,
            403 => ErrorKind::AccessDenied,
            404 => ErrorKind::NotFound,
            422 => ErrorKind::Validation,
            400..=499 => ErrorKind::BadRequest,
            502 => ErrorKind::Upstream,
            _ => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl ErrorBody {
    /// Creates a new error body.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
