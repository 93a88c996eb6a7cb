use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::auth::{AccessError, AuthError};
use crate::models::ErrorResponse;

/// Reasons an upgrade request is refused before any connection exists.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("origin {0:?} is not allowed")]
    OriginNotAllowed(Option<String>),

    #[error("invalid document ID {0:?}")]
    InvalidDocumentId(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Access(#[from] AccessError),
}

impl HandshakeError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandshakeError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            HandshakeError::InvalidDocumentId(_) => StatusCode::BAD_REQUEST,
            HandshakeError::Auth(AuthError::NotConfigured) => StatusCode::INTERNAL_SERVER_ERROR,
            HandshakeError::Auth(_) => StatusCode::UNAUTHORIZED,
            HandshakeError::Access(AccessError::NotFound(_)) => StatusCode::NOT_FOUND,
            HandshakeError::Access(AccessError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            HandshakeError::Access(AccessError::Backend(_) | AccessError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Server-side failures are logged, not echoed to the client.
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse::new(status, message))).into_response()
    }
}
