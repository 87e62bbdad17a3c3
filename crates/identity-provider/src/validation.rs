//! Bearer token validation for `/userinfo` and `/me`
//!
//! Both endpoints accept only access tokens (`token_use == "access"`) signed
//! by the current key. Identity tokens are refused.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::directory::User;
use crate::error::IdpError;
use crate::tokens::{Claims, TOKEN_USE_ACCESS};
use crate::AppState;

/// Why a request was refused before reaching the handler body.
#[derive(Debug)]
pub struct Unauthorized(&'static str);

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        let challenge = if self.0.starts_with("Invalid token") {
            "Bearer error=\"invalid_token\""
        } else {
            "Bearer"
        };
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, challenge)],
            Json(serde_json::json!({ "error": self.0 })),
        )
            .into_response()
    }
}

/// Extract and verify the bearer access token, returning its claims.
pub fn authenticate_bearer(state: &AppState, headers: &HeaderMap) -> Result<Claims, Unauthorized> {
    let auth_header = headers.get(header::AUTHORIZATION).ok_or_else(|| {
        tracing::debug!("No Authorization header present");
        Unauthorized("Missing Authorization header")
    })?;

    let auth_str = auth_header.to_str().map_err(|_| {
        tracing::debug!("Invalid Authorization header encoding");
        Unauthorized("Invalid Authorization header")
    })?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| {
            tracing::debug!("Authorization header does not start with 'Bearer '");
            Unauthorized("Invalid Authorization header format")
        })?;

    let claims = state
        .tokens
        .validate_access_token(token)
        .map_err(|_| Unauthorized("Invalid token"))?;

    if claims.get("token_use").and_then(Value::as_str) != Some(TOKEN_USE_ACCESS) {
        tracing::debug!("Bearer token is not an access token");
        return Err(Unauthorized("Invalid token use"));
    }

    Ok(claims)
}

fn subject(claims: &Claims) -> Result<&str, Unauthorized> {
    claims
        .get("sub")
        .and_then(Value::as_str)
        .ok_or(Unauthorized("Invalid token"))
}

/// Handler for `GET /userinfo`: `sub` plus every user attribute.
///
/// An attribute named `sub` never overrides the subject.
pub async fn userinfo(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let claims = match authenticate_bearer(&state, &headers) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };
    let sub = match subject(&claims) {
        Ok(sub) => sub,
        Err(e) => return e.into_response(),
    };

    let Some(user) = state.users.get(sub) else {
        return IdpError::Internal(format!("token subject {} not found", sub)).into_response();
    };

    let mut info = serde_json::Map::new();
    info.insert("sub".to_string(), Value::from(user.id.as_str()));
    for (name, value) in user.attributes {
        info.entry(name).or_insert(value);
    }
    Json(Value::Object(info)).into_response()
}

/// Handler for `GET /me`: the stored user record, without its password.
pub async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let claims = match authenticate_bearer(&state, &headers) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };
    let sub = match subject(&claims) {
        Ok(sub) => sub,
        Err(e) => return e.into_response(),
    };

    match state.users.get(sub) {
        Some(user) => Json::<User>(user).into_response(),
        None => IdpError::Internal(format!("token subject {} not found", sub)).into_response(),
    }
}
