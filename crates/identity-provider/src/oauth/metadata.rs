//! OpenID Connect Discovery and JWKS
//!
//! Provides `/.well-known/openid-configuration` and `/.well-known/jwks.json`,
//! which relying parties use to find endpoints and verify token signatures.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::keys::Jwks;
use crate::AppState;

/// OpenID Provider Metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// The `iss` value of every token this provider signs
    pub issuer: String,

    /// URL of the authorization endpoint
    pub authorization_endpoint: String,

    /// URL of the token endpoint
    pub token_endpoint: String,

    /// URL of the userinfo endpoint
    pub userinfo_endpoint: String,

    /// URL of the JSON Web Key Set
    pub jwks_uri: String,

    pub response_types_supported: Vec<String>,

    pub subject_types_supported: Vec<String>,

    pub id_token_signing_alg_values_supported: Vec<String>,

    pub grant_types_supported: Vec<String>,
}

impl ProviderMetadata {
    pub fn new(issuer: &str, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{}/oauth2/authorize", base_url),
            token_endpoint: format!("{}/oauth2/token", base_url),
            userinfo_endpoint: format!("{}/userinfo", base_url),
            jwks_uri: format!("{}/.well-known/jwks.json", base_url),
            response_types_supported: vec!["code".to_string()],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            grant_types_supported: vec!["authorization_code".to_string()],
        }
    }
}

/// Handler for `GET /.well-known/openid-configuration`
pub async fn openid_configuration(State(state): State<Arc<AppState>>) -> Json<ProviderMetadata> {
    tracing::debug!("Serving OpenID provider metadata");
    Json(ProviderMetadata::new(
        &state.config.issuer,
        &state.config.base_url,
    ))
}

/// Handler for `GET /.well-known/jwks.json`
pub async fn jwks(State(state): State<Arc<AppState>>) -> Json<Jwks> {
    Json(state.keys.public_jwks())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_derive_from_base_url() {
        let metadata = ProviderMetadata::new("https://issuer.example", "https://idp.example/");
        assert_eq!(metadata.issuer, "https://issuer.example");
        assert_eq!(
            metadata.authorization_endpoint,
            "https://idp.example/oauth2/authorize"
        );
        assert_eq!(metadata.token_endpoint, "https://idp.example/oauth2/token");
        assert_eq!(metadata.userinfo_endpoint, "https://idp.example/userinfo");
        assert_eq!(
            metadata.jwks_uri,
            "https://idp.example/.well-known/jwks.json"
        );
        assert_eq!(metadata.id_token_signing_alg_values_supported, ["RS256"]);
    }
}
