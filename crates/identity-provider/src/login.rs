//! Challenge-based JSON login API
//!
//! `POST /login/init` -> `{challenge_id}`
//! `POST /login/complete` -> `{access_token, refresh_token?, identity_token}`
//! `POST /login/refresh` -> same shape, with a rotated refresh token

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::IdpError;
use crate::flows::challenge_login::{self, LoginComplete, LoginInit, LoginInitResponse, LoginTokens};
use crate::flows::refresh::RefreshRequest;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    #[serde(default)]
    pub client_id: Option<String>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, IdpError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!("Rejected login API body: {}", rejection);
        IdpError::Validation("Invalid request body".to_string())
    })
}

/// Handler for `POST /login/init`
///
/// A `client_id` query parameter takes precedence over the one in the body.
pub async fn init(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClientQuery>,
    payload: Result<Json<LoginInit>, JsonRejection>,
) -> Result<Json<LoginInitResponse>, IdpError> {
    let mut request = body(payload)?;
    if let Some(client_id) = query.client_id.filter(|c| !c.is_empty()) {
        request.client_id = client_id;
    }
    challenge_login::init(&state, request).map(Json)
}

/// Handler for `POST /login/complete`
pub async fn complete(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginComplete>, JsonRejection>,
) -> Result<Json<LoginTokens>, IdpError> {
    challenge_login::complete(&state, body(payload)?).map(Json)
}

/// Handler for `POST /login/refresh`
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<LoginTokens>, IdpError> {
    let request = body(payload)?;
    crate::flows::refresh::refresh(&state, &request.refresh_token).map(Json)
}
