//! Error type shared by the flows and HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdpError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),
    /// Bad credentials, disabled account, or an invalid/expired/consumed
    /// opaque token.
    #[error("{0}")]
    Authentication(String),
    /// Client, redirect URI or grant do not line up.
    #[error("{0}")]
    Mismatch(String),
    #[error("{0}")]
    NotFound(String),
    /// A stored record points at a user or client that no longer exists.
    #[error("Internal inconsistency: {0}")]
    Internal(String),
    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("Key generation failed: {0}")]
    KeyGeneration(#[from] rsa::Error),
}

impl IdpError {
    pub fn status(&self) -> StatusCode {
        match self {
            IdpError::Validation(_) | IdpError::Mismatch(_) => StatusCode::BAD_REQUEST,
            IdpError::Authentication(_) => StatusCode::UNAUTHORIZED,
            IdpError::NotFound(_) => StatusCode::NOT_FOUND,
            IdpError::Internal(_) | IdpError::Signing(_) | IdpError::KeyGeneration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the caller. Server-side failures are logged
    /// and replaced with a generic message.
    pub fn public_message(&self) -> String {
        match self {
            IdpError::Internal(_) | IdpError::Signing(_) | IdpError::KeyGeneration(_) => {
                tracing::error!("{}", self);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// The RFC 6749 error code used by the token endpoint.
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            IdpError::Validation(_) => "invalid_request",
            IdpError::Authentication(_) => "invalid_client",
            IdpError::Mismatch(_) | IdpError::NotFound(_) => "invalid_grant",
            IdpError::Internal(_) | IdpError::Signing(_) | IdpError::KeyGeneration(_) => {
                "server_error"
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for IdpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            IdpError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IdpError::Mismatch("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IdpError::Authentication("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            IdpError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            IdpError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = IdpError::Internal("user 42 vanished".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = IdpError::Authentication("Invalid credentials".into());
        assert_eq!(err.public_message(), "Invalid credentials");
    }
}
