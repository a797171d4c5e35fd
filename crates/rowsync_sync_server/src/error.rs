//! Error types for the sync server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rowsync_core::{CoreError, ValidationError};
use rowsync_sync_protocol::{ErrorBody, ErrorKind, ProtocolError};
use thiserror::Error;

/// Result type for gateway and proxy operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors returned to clients of the sync server.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No session could be resolved.
    #[error("authentication required")]
    Unauthenticated,

    /// An access predicate denied the operation.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Payload or identity failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The write matched no row.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The upstream change-feed service failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The server was assembled incorrectly.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the wire category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Unauthenticated => ErrorKind::Unauthenticated,
            GatewayError::AccessDenied(_) => ErrorKind::AccessDenied,
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::BadRequest(_) => ErrorKind::BadRequest,
            GatewayError::Upstream(_) => ErrorKind::Upstream,
            GatewayError::Config(_) | GatewayError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Builds the JSON error body.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            GatewayError::Unauthenticated => "authentication required".to_string(),
            GatewayError::AccessDenied(m)
            | GatewayError::Validation(m)
            | GatewayError::NotFound(m)
            | GatewayError::BadRequest(m)
            | GatewayError::Upstream(m) => m.clone(),
            GatewayError::Config(_) | GatewayError::Internal(_) => "internal server error".to_string(),
        };
        ErrorBody::new(self.kind(), message)
    }
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        GatewayError::Validation(err.to_string())
    }
}

impl From<ProtocolError> for GatewayError {
    fn from(err: ProtocolError) -> Self {
        GatewayError::BadRequest(err.to_string())
    }
}

impl From<CoreError> for GatewayError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => e.into(),
            CoreError::DuplicateKey { .. } => GatewayError::Validation(err.to_string()),
            CoreError::Protocol(e) => e.into(),
            CoreError::Upstream { message } => GatewayError::Upstream(message),
            other => {
                tracing::error!(error = %other, "store failure");
                GatewayError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_sync_protocol::RowKey;

    #[test]
    fn error_classification() {
        assert!(GatewayError::Unauthenticated.is_client_error());
        assert!(GatewayError::AccessDenied("no".into()).is_client_error());
        assert!(GatewayError::Upstream("down".into()).is_server_error());
        assert!(!GatewayError::NotFound("gone".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(GatewayError::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::AccessDenied("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(GatewayError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::Validation("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(GatewayError::Upstream("x".into()).status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn core_errors_map_to_client_categories() {
        let duplicate = CoreError::DuplicateKey {
            table: "todos".into(),
            key: RowKey::Int(1),
        };
        assert_eq!(GatewayError::from(duplicate).kind(), ErrorKind::Validation);

        let aborted = CoreError::transaction_aborted("disk full");
        assert_eq!(GatewayError::from(aborted).kind(), ErrorKind::Internal);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let body = GatewayError::Internal("connection string leaked".into()).to_body();
        assert_eq!(body.message, "internal server error");
        assert_eq!(body.kind, ErrorKind::Internal);
    }
}
