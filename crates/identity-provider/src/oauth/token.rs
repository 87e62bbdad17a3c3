//! OAuth2 Token Endpoint
//!
//! Only the `authorization_code` grant is supported here. Refresh tokens are
//! handled by the login API (`/login/refresh`).

use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Serialize;

use crate::flows::authorization_code::{self, ExchangeParams};
use crate::AppState;

/// Token error response
#[derive(Debug, Serialize)]
pub struct TokenError {
    pub error: String,
    pub error_description: String,
}

impl TokenError {
    fn response(status: StatusCode, error: &str, description: String) -> Response {
        (
            status,
            Json(TokenError {
                error: error.to_string(),
                error_description: description,
            }),
        )
            .into_response()
    }
}

/// Handler for `POST /oauth2/token`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Form<ExchangeParams>, FormRejection>,
) -> Response {
    let params = match payload {
        Ok(Form(params)) => params,
        Err(rejection) => {
            tracing::debug!("Rejected token request body: {}", rejection);
            return TokenError::response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "Invalid form data".to_string(),
            );
        }
    };

    if params.grant_type != "authorization_code" {
        return TokenError::response(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            "Only the authorization_code grant is supported".to_string(),
        );
    }

    match authorization_code::exchange(&state, params) {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => TokenError::response(e.status(), e.oauth_error_code(), e.public_message()),
    }
}
