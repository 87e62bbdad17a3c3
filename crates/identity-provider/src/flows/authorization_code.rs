//! OAuth2 authorization code flow.
//!
//! `initiate` validates the authorize request and produces the login form,
//! `submit` authenticates the user and stores a single-use grant, and
//! `exchange` trades the grant's code for access and identity tokens.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::IdpError;
use crate::storage::{generate_random_token, AuthorizationGrant, AUTHORIZATION_CODE_TTL_SECS};
use crate::AppState;

const INVALID_LOGIN: &str = "Invalid username or password";
const CHALLENGE_REQUIRED: &str = "Challenge is required";

/// Query parameters of `GET /oauth2/authorize`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizeParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: String,
    pub state: String,
    pub nonce: String,
}

/// Everything the login form needs to render and post back.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoginForm {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub nonce: String,
    pub show_challenge: bool,
    pub error: Option<String>,
}

/// Form fields of `POST /oauth2/authorize/submit`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubmitParams {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub nonce: String,
    pub challenge: String,
}

impl SubmitParams {
    fn retry(&self, state: &AppState, error: &str) -> SubmitOutcome {
        SubmitOutcome::Retry(LoginForm {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scope: self.scope.clone(),
            state: self.state.clone(),
            nonce: self.nonce.clone(),
            show_challenge: state.config.oauth2.require_challenge_on_login,
            error: Some(error.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Credentials accepted: send the browser here (code and state attached).
    Redirect(String),
    /// Show the form again with an error. Nothing was stored.
    Retry(LoginForm),
}

/// Form fields of `POST /oauth2/token`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExchangeParams {
    pub grant_type: String,
    pub code: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Successful token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Validate an authorization request and build the login form context.
pub fn initiate(state: &AppState, params: AuthorizeParams) -> Result<LoginForm, IdpError> {
    if params.response_type != "code" {
        return Err(IdpError::Validation(
            "response_type must be 'code'".to_string(),
        ));
    }

    if state
        .clients
        .find_by_redirect(&params.client_id, &params.redirect_uri)
        .is_none()
    {
        tracing::debug!(
            "Rejected authorize request for client {} with redirect {}",
            params.client_id,
            params.redirect_uri
        );
        return Err(IdpError::Mismatch(
            "Invalid client_id or redirect_uri".to_string(),
        ));
    }

    let scope = if params.scope.is_empty() {
        state.config.oauth2.default_scopes.clone()
    } else {
        params.scope
    };

    Ok(LoginForm {
        client_id: params.client_id,
        redirect_uri: params.redirect_uri,
        scope,
        state: params.state,
        nonce: params.nonce,
        show_challenge: state.config.oauth2.require_challenge_on_login,
        error: None,
    })
}

/// Authenticate the login form and, on success, issue an authorization code.
///
/// Unknown user, wrong password and disabled account all produce the same
/// error so the form does not reveal which accounts exist.
pub fn submit(state: &AppState, params: SubmitParams) -> Result<SubmitOutcome, IdpError> {
    if state.config.oauth2.require_challenge_on_login && params.challenge.is_empty() {
        return Ok(params.retry(state, CHALLENGE_REQUIRED));
    }

    let client = state
        .clients
        .find_by_redirect(&params.client_id, &params.redirect_uri)
        .ok_or_else(|| IdpError::Mismatch("Invalid client_id or redirect_uri".to_string()))?;

    let user = match state.users.authenticate(&params.username, &params.password) {
        Ok(user) => user,
        Err(reason) => {
            tracing::debug!("Login form rejected ({:?})", reason);
            return Ok(params.retry(state, INVALID_LOGIN));
        }
    };

    let code = generate_random_token();
    let redirect = redirect_with_code(&params.redirect_uri, &code, &params.state)?;

    let scopes = if params.scope.is_empty() {
        state.config.oauth2.default_scopes.clone()
    } else {
        params.scope
    };

    let now = Utc::now();
    state.flows.grants.put(
        &code,
        AuthorizationGrant {
            user_id: user.id.clone(),
            client_id: client.id.clone(),
            redirect_uri: params.redirect_uri,
            nonce: params.nonce,
            scopes,
            created_at: now,
            expires_at: now + Duration::seconds(AUTHORIZATION_CODE_TTL_SECS),
        },
    );

    tracing::info!(
        "Issued authorization code for user {} and client {}",
        user.id,
        client.id
    );

    Ok(SubmitOutcome::Redirect(redirect))
}

/// Exchange an authorization code for tokens.
///
/// The code is consumed as soon as it is looked up, so it cannot be
/// replayed even when a later check fails.
pub fn exchange(state: &AppState, params: ExchangeParams) -> Result<TokenResponse, IdpError> {
    if params.grant_type != "authorization_code" {
        return Err(IdpError::Validation(
            "grant_type must be 'authorization_code'".to_string(),
        ));
    }

    let client = state
        .clients
        .authenticate(&params.client_id, &params.client_secret)
        .ok_or_else(|| IdpError::Authentication("Invalid client credentials".to_string()))?;

    let grant = state
        .flows
        .grants
        .take_if_valid(&params.code, Utc::now())
        .ok_or_else(|| IdpError::Mismatch("Invalid authorization code".to_string()))?;

    if grant.client_id != params.client_id || grant.redirect_uri != params.redirect_uri {
        tracing::warn!(
            "Authorization code for client {} presented by client {}",
            grant.client_id,
            params.client_id
        );
        return Err(IdpError::Mismatch(
            "Invalid client_id or redirect_uri".to_string(),
        ));
    }

    let user = state.users.get(&grant.user_id).ok_or_else(|| {
        IdpError::Internal(format!(
            "authorization code references unknown user {}",
            grant.user_id
        ))
    })?;

    let access_token = state
        .tokens
        .issue_access_token(&user, client, &grant.scopes)?;
    let id_token = state
        .tokens
        .issue_identity_token(&user, client, &grant.nonce)?;

    tracing::info!("Exchanged authorization code for user {}", user.id);

    Ok(TokenResponse {
        access_token,
        id_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.access_token_expiration_seconds,
    })
}

/// Append `code` (and `state`, when present) to the client's redirect URI.
fn redirect_with_code(redirect_uri: &str, code: &str, client_state: &str) -> Result<String, IdpError> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|_| IdpError::Validation("Invalid redirect_uri".to_string()))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("code", code);
        if !client_state.is_empty() {
            query.append_pair("state", client_state);
        }
    }
    Ok(url.into())
}
