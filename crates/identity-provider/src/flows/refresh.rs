//! Refresh token rotation.

use chrono::Utc;
use serde::Deserialize;

use crate::error::IdpError;
use crate::flows::challenge_login::LoginTokens;
use crate::flows::refresh_token_expiry;
use crate::storage::{generate_random_token, RefreshTokenRecord};
use crate::AppState;

/// Body of `POST /login/refresh`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Trade a refresh token for new tokens and a replacement refresh token.
///
/// Once taken, the presented token can never be used twice, even if issuing
/// the new tokens fails.
pub fn refresh(state: &AppState, refresh_token: &str) -> Result<LoginTokens, IdpError> {
    let now = Utc::now();
    let expires_at = refresh_token_expiry(state, now)?;

    let record = state
        .flows
        .refresh_tokens
        .take_if_valid(refresh_token, now)
        .ok_or_else(|| IdpError::Authentication("Invalid or expired refresh token".to_string()))?;

    let user = state.users.get(&record.user_id).ok_or_else(|| {
        IdpError::Internal(format!(
            "refresh token references unknown user {}",
            record.user_id
        ))
    })?;
    let client = state.clients.get(&record.client_id).ok_or_else(|| {
        IdpError::Internal(format!(
            "refresh token references unknown client {}",
            record.client_id
        ))
    })?;

    let access_token = state.tokens.issue_access_token(&user, client, &record.scopes)?;
    let identity_token = state.tokens.issue_identity_token(&user, client, "")?;

    let rotated = generate_random_token();
    state.flows.refresh_tokens.put(
        &rotated,
        RefreshTokenRecord {
            expires_at,
            ..record
        },
    );

    tracing::info!("Refresh token rotated for user {}", user.id);

    Ok(LoginTokens {
        access_token,
        refresh_token: Some(rotated),
        identity_token,
    })
}
