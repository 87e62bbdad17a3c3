//! Two-step JSON login: credentials first, then a challenge answer.
//!
//! `init` checks the password and parks a [`PendingLoginChallenge`] for five
//! minutes. `complete` consumes it and hands out tokens. The challenge answer
//! is not verified beyond being present.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::directory::AuthFailure;
use crate::error::IdpError;
use crate::flows::refresh_token_expiry;
use crate::storage::{generate_random_token, PendingLoginChallenge, RefreshTokenRecord};
use crate::AppState;

/// Body of `POST /login/init`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginInit {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub issue_refresh_token: bool,
    pub scopes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInitResponse {
    pub challenge_id: String,
}

/// Body of `POST /login/complete`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginComplete {
    pub challenge_id: String,
    pub challenge_data: String,
}

/// Tokens handed out by `/login/complete` and `/login/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub identity_token: String,
}

pub fn init(state: &AppState, request: LoginInit) -> Result<LoginInitResponse, IdpError> {
    if request.client_id.is_empty() {
        return Err(IdpError::Validation("Client ID is required".to_string()));
    }

    let client = state
        .clients
        .get(&request.client_id)
        .ok_or_else(|| IdpError::Validation("Invalid client ID".to_string()))?;

    let user = state
        .users
        .authenticate(&request.username, &request.password)
        .map_err(|reason| {
            tracing::debug!("Login init rejected for {:?}: {:?}", request.username, reason);
            match reason {
                AuthFailure::InvalidCredentials => {
                    IdpError::Authentication("Invalid credentials".to_string())
                }
                AuthFailure::Disabled => IdpError::Authentication("User is disabled".to_string()),
            }
        })?;

    let scopes = if request.scopes.is_empty() {
        state.config.login_api.default_scopes.clone()
    } else {
        request.scopes
    };

    let challenge_id = generate_random_token();
    state.flows.challenges.put(
        &challenge_id,
        PendingLoginChallenge {
            user_id: user.id.clone(),
            client_id: client.id.clone(),
            issue_refresh_token: request.issue_refresh_token,
            scopes,
            created_at: Utc::now(),
        },
    );

    tracing::info!("Login challenge issued for user {}", user.id);

    Ok(LoginInitResponse { challenge_id })
}

/// Consume a challenge and issue tokens.
///
/// The challenge is taken before `challenge_data` is looked at, so a
/// request with an empty answer still burns it.
pub fn complete(state: &AppState, request: LoginComplete) -> Result<LoginTokens, IdpError> {
    let now = Utc::now();
    let refresh_expires_at = refresh_token_expiry(state, now)?;

    let challenge = state
        .flows
        .challenges
        .take_if_valid(&request.challenge_id, now)
        .ok_or_else(|| IdpError::Authentication("Invalid or expired challenge".to_string()))?;

    if request.challenge_data.is_empty() {
        return Err(IdpError::Authentication("Invalid challenge response".to_string()));
    }

    let user = state.users.get(&challenge.user_id).ok_or_else(|| {
        IdpError::Internal(format!("challenge references unknown user {}", challenge.user_id))
    })?;
    let client = state.clients.get(&challenge.client_id).ok_or_else(|| {
        IdpError::Internal(format!(
            "challenge references unknown client {}",
            challenge.client_id
        ))
    })?;

    let access_token = state
        .tokens
        .issue_access_token(&user, client, &challenge.scopes)?;
    let identity_token = state.tokens.issue_identity_token(&user, client, "")?;

    let refresh_token = if challenge.issue_refresh_token {
        let token = generate_random_token();
        state.flows.refresh_tokens.put(
            &token,
            RefreshTokenRecord {
                user_id: user.id.clone(),
                client_id: client.id.clone(),
                scopes: challenge.scopes,
                expires_at: refresh_expires_at,
            },
        );
        Some(token)
    } else {
        None
    };

    tracing::info!(
        "Login completed for user {} (refresh token: {})",
        user.id,
        refresh_token.is_some()
    );

    Ok(LoginTokens {
        access_token,
        refresh_token,
        identity_token,
    })
}
