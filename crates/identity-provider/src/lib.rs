//! OAuth2 / OpenID Connect identity provider
//!
//! Provides:
//! - OpenID Connect discovery and JWKS publication
//! - Authorization code flow with an HTML login form
//! - A challenge-based JSON login API with refresh token rotation
//! - `/userinfo` and `/me` for bearer access tokens
//! - User management endpoints
//!
//! All flow state (challenges, authorization codes, refresh tokens) is held
//! in memory and lost on restart.

pub mod config;
pub mod directory;
pub mod error;
pub mod flows;
pub mod keys;
pub mod login;
pub mod oauth;
pub mod storage;
pub mod tokens;
pub mod users;
pub mod validation;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::directory::{ClientDirectory, UserDirectory};
use crate::error::IdpError;
use crate::keys::KeyRing;
use crate::storage::FlowState;
use crate::tokens::{TokenIssuer, TokenPolicy};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub keys: KeyRing,
    pub tokens: TokenIssuer,
    pub flows: FlowState,
    pub users: UserDirectory,
    pub clients: ClientDirectory,
}

impl AppState {
    /// Build the state with a freshly generated signing key.
    pub fn new(config: Config) -> Result<Self, IdpError> {
        let keys = KeyRing::generate()?;
        Ok(Self::with_keys(config, keys))
    }

    /// Build the state around an existing key ring.
    pub fn with_keys(config: Config, keys: KeyRing) -> Self {
        let tokens = TokenIssuer::new(keys.clone(), TokenPolicy::from_config(&config));
        let users = UserDirectory::new(config.users.clone());
        let clients = ClientDirectory::new(config.clients.clone());

        Self {
            config,
            keys,
            tokens,
            flows: FlowState::new(),
            users,
            clients,
        }
    }
}

/// Build the router. OAuth2 and login API routes are mounted only when
/// enabled in the configuration.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(users::healthz))
        .route("/.well-known/jwks.json", get(oauth::metadata::jwks))
        .route(
            "/.well-known/openid-configuration",
            get(oauth::metadata::openid_configuration),
        )
        .route("/userinfo", get(validation::userinfo))
        .route("/me", get(validation::me))
        .route("/users", get(users::list))
        .route(
            "/users/{id}",
            get(users::get).put(users::put).delete(users::delete),
        )
        .route("/users/{id}/disable", post(users::disable))
        .route("/users/{id}/enable", post(users::enable));

    if state.config.oauth2.enabled {
        router = router
            .route("/oauth2/authorize", get(oauth::authorize::get_handler))
            .route(
                "/oauth2/authorize/submit",
                post(oauth::authorize::submit_handler),
            )
            .route("/oauth2/token", post(oauth::token::handler));
        tracing::info!("OAuth2 endpoints enabled");
    } else {
        tracing::info!("OAuth2 endpoints disabled");
    }

    if state.config.login_api.enabled {
        router = router
            .route("/login/init", post(login::init))
            .route("/login/complete", post(login::complete))
            .route("/login/refresh", post(login::refresh));
        tracing::info!("Login API endpoints enabled");
    } else {
        tracing::info!("Login API endpoints disabled");
    }

    let cors = cors_layer(&state.config);

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match config.cors_origins() {
        None => layer.allow_origin(Any),
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin {:?}", o);
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(origins))
        }
    }
}
