//! Health check and user management endpoints
//!
//! These routes are unauthenticated and meant to sit behind a private
//! network boundary.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::directory::{Upserted, User, UserUpdate};
use crate::error::IdpError;
use crate::AppState;

/// Handler for `GET /healthz`
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}

/// Handler for `GET /users`
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<User>> {
    Json(state.users.list())
}

/// Handler for `GET /users/{id}`
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, IdpError> {
    state.users.get(&id).map(Json).ok_or_else(user_not_found)
}

/// Handler for `PUT /users/{id}`: 201 when created, 200 when updated.
pub async fn put(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UserUpdate>, JsonRejection>,
) -> Result<Response, IdpError> {
    let Json(update) = payload.map_err(|rejection| {
        tracing::debug!("Rejected user update body: {}", rejection);
        IdpError::Validation("Invalid request".to_string())
    })?;

    Ok(match state.users.upsert(&id, update) {
        Upserted::Created(user) => {
            tracing::info!("Created user {}", user.id);
            (StatusCode::CREATED, Json(user)).into_response()
        }
        Upserted::Updated(user) => {
            tracing::info!("Updated user {}", user.id);
            (StatusCode::OK, Json(user)).into_response()
        }
    })
}

/// Handler for `DELETE /users/{id}`
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, IdpError> {
    if !state.users.delete(&id) {
        return Err(user_not_found());
    }
    tracing::info!("Deleted user {}", id);
    Ok(Json(json!({ "message": "User deleted" })))
}

/// Handler for `POST /users/{id}/disable`
pub async fn disable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, IdpError> {
    set_disabled(&state, &id, true)
}

/// Handler for `POST /users/{id}/enable`
pub async fn enable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, IdpError> {
    set_disabled(&state, &id, false)
}

fn set_disabled(state: &AppState, id: &str, disabled: bool) -> Result<StatusCode, IdpError> {
    if !state.users.set_disabled(id, disabled) {
        return Err(user_not_found());
    }
    tracing::info!(
        "User {} {}",
        id,
        if disabled { "disabled" } else { "enabled" }
    );
    Ok(StatusCode::NO_CONTENT)
}

fn user_not_found() -> IdpError {
    IdpError::NotFound("User not found".to_string())
}
