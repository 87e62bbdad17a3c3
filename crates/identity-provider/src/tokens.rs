//! Access and identity token issuance (RS256 JWTs) and access token
//! validation.

use std::collections::BTreeMap;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::directory::{Attributes, Client, User};
use crate::error::IdpError;
use crate::keys::KeyRing;
use crate::storage::generate_random_token;

pub const TOKEN_USE_ACCESS: &str = "access";
pub const TOKEN_USE_ID: &str = "id";

/// Decoded JWT claims, ordered by name.
pub type Claims = Map<String, Value>;

/// What goes into a token and how long it lives.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub issuer: String,
    pub access_token_ttl_secs: u64,
    /// Used when a caller asks for an access token with no scopes.
    pub default_scope: String,
    pub access_claims: Option<BTreeMap<String, String>>,
    pub identity_claims: Option<BTreeMap<String, String>>,
}

impl TokenPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            issuer: config.issuer.clone(),
            access_token_ttl_secs: config.access_token_expiration_seconds,
            default_scope: "openid profile".to_string(),
            access_claims: config.map_access_token_claims.clone(),
            identity_claims: config.map_identity_token_claims.clone(),
        }
    }
}

/// Mints and checks signed tokens with the current signing key.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: KeyRing,
    policy: TokenPolicy,
}

impl TokenIssuer {
    pub fn new(keys: KeyRing, policy: TokenPolicy) -> Self {
        Self { keys, policy }
    }

    /// Sign an access token for `user` on behalf of `client`.
    pub fn issue_access_token(
        &self,
        user: &User,
        client: &Client,
        scopes: &str,
    ) -> Result<String, IdpError> {
        let scope = if scopes.is_empty() {
            self.policy.default_scope.as_str()
        } else {
            scopes
        };

        let mut claims = self.base_claims(user, client, TOKEN_USE_ACCESS)?;
        claims.insert("scope".to_string(), Value::from(scope));

        if let Some(mapping) = &self.policy.access_claims {
            apply_claim_mapping(&mut claims, mapping, &user.attributes);
        }

        self.sign(&claims)
    }

    /// Sign an identity token. `nonce` is echoed only when non-empty.
    ///
    /// With an identity claim mapping configured only the mapped attributes
    /// are copied; without one, every attribute is.
    pub fn issue_identity_token(
        &self,
        user: &User,
        client: &Client,
        nonce: &str,
    ) -> Result<String, IdpError> {
        let mut claims = self.base_claims(user, client, TOKEN_USE_ID)?;
        if !nonce.is_empty() {
            claims.insert("nonce".to_string(), Value::from(nonce));
        }

        match &self.policy.identity_claims {
            Some(mapping) => apply_claim_mapping(&mut claims, mapping, &user.attributes),
            None => {
                for (name, value) in &user.attributes {
                    claims.insert(name.clone(), value.clone());
                }
            }
        }

        self.sign(&claims)
    }

    /// Verify an access token against the current key and return its claims.
    ///
    /// Only RS256 is accepted and expiry is checked with no leeway.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, IdpError> {
        let signing_key = self.keys.current_signing_key();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_aud = false;

        decode::<Claims>(token, signing_key.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Access token rejected: {}", e);
                IdpError::Authentication("Invalid token".to_string())
            })
    }

    fn base_claims(&self, user: &User, client: &Client, token_use: &str) -> Result<Claims, IdpError> {
        let now = Utc::now().timestamp();
        let ttl = self.policy.access_token_ttl_secs;
        let exp = i64::try_from(ttl)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| IdpError::Internal(format!("token lifetime {ttl}s is out of range")))?;

        let mut claims = Claims::new();
        claims.insert("sub".to_string(), Value::from(user.id.as_str()));
        claims.insert("iss".to_string(), Value::from(self.policy.issuer.as_str()));
        claims.insert("aud".to_string(), Value::from(client.audience.as_str()));
        claims.insert("iat".to_string(), Value::from(now));
        claims.insert("exp".to_string(), Value::from(exp));
        claims.insert("auth_time".to_string(), Value::from(now));
        claims.insert("token_use".to_string(), Value::from(token_use));
        claims.insert("client_id".to_string(), Value::from(client.id.as_str()));
        claims.insert("jti".to_string(), Value::from(generate_random_token()));
        Ok(claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, IdpError> {
        let signing_key = self.keys.current_signing_key();
        let mut header = Header::new(signing_key.algorithm);
        header.kid = Some(signing_key.kid.clone());
        Ok(encode(&header, claims, signing_key.encoding_key())?)
    }
}

/// Copy `attribute -> claim` for every mapped attribute the user has.
fn apply_claim_mapping(
    claims: &mut Claims,
    mapping: &BTreeMap<String, String>,
    attributes: &Attributes,
) {
    for (claim_name, attribute_name) in mapping {
        if let Some(value) = attributes.get(attribute_name) {
            claims.insert(claim_name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::shared_test_keys;
    use jsonwebtoken::{decode_header, EncodingKey};
    use serde_json::json;

    fn user() -> User {
        let mut attributes = Attributes::new();
        attributes.insert("role_name".to_string(), json!("administrator"));
        attributes.insert("email".to_string(), json!("admin@example.com"));
        attributes.insert("level".to_string(), json!(3));
        User {
            id: "1".to_string(),
            username: "admin".to_string(),
            password: "admin123".to_string(),
            disabled: false,
            attributes,
        }
    }

    fn client() -> Client {
        Client {
            id: "client1".to_string(),
            secret: "super_secret".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            audience: "my-api".to_string(),
        }
    }

    fn policy() -> TokenPolicy {
        TokenPolicy {
            issuer: "http://localhost:8080".to_string(),
            access_token_ttl_secs: 900,
            default_scope: "openid profile".to_string(),
            access_claims: None,
            identity_claims: None,
        }
    }

    fn payload(token: &str) -> Claims {
        use base64::Engine;
        let part = token.split('.').nth(1).unwrap();
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(part)
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_access_token_claims() {
        let keys = shared_test_keys();
        let issuer = TokenIssuer::new(keys.clone(), policy());
        let token = issuer.issue_access_token(&user(), &client(), "").unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(keys.current_signing_key().kid.as_str()));

        let claims = issuer.validate_access_token(&token).unwrap();
        assert_eq!(claims["sub"], json!("1"));
        assert_eq!(claims["iss"], json!("http://localhost:8080"));
        assert_eq!(claims["aud"], json!("my-api"));
        assert_eq!(claims["token_use"], json!("access"));
        assert_eq!(claims["client_id"], json!("client1"));
        assert_eq!(claims["scope"], json!("openid profile"));
        assert_eq!(claims["auth_time"], claims["iat"]);
        assert_eq!(
            claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
            900
        );
        assert_eq!(claims["jti"].as_str().unwrap().len(), 43);
        // No mapping configured: attributes stay out of access tokens
        assert!(claims.get("role_name").is_none());
    }

    #[test]
    fn test_requested_scope_is_kept() {
        let issuer = TokenIssuer::new(shared_test_keys(), policy());
        let token = issuer
            .issue_access_token(&user(), &client(), "openid email")
            .unwrap();
        assert_eq!(payload(&token)["scope"], json!("openid email"));
    }

    #[test]
    fn test_access_claim_mapping_omits_missing_attributes() {
        let mut policy = policy();
        policy.access_claims = Some(BTreeMap::from([
            ("roles".to_string(), "role_name".to_string()),
            ("dept".to_string(), "department".to_string()),
        ]));
        let issuer = TokenIssuer::new(shared_test_keys(), policy);
        let claims = payload(&issuer.issue_access_token(&user(), &client(), "").unwrap());

        assert_eq!(claims["roles"], json!("administrator"));
        assert!(claims.get("dept").is_none());
        assert!(claims.get("role_name").is_none());
        assert!(claims.get("email").is_none());
    }

    #[test]
    fn test_identity_token_copies_all_attributes_without_mapping() {
        let issuer = TokenIssuer::new(shared_test_keys(), policy());
        let claims = payload(&issuer.issue_identity_token(&user(), &client(), "n-0S6").unwrap());

        assert_eq!(claims["token_use"], json!("id"));
        assert_eq!(claims["nonce"], json!("n-0S6"));
        assert!(claims.get("scope").is_none());
        for name in ["role_name", "email", "level"] {
            assert!(claims.contains_key(name), "missing attribute {name}");
        }
        assert_eq!(claims["level"], json!(3));
    }

    #[test]
    fn test_identity_mapping_suppresses_passthrough() {
        let mut policy = policy();
        policy.identity_claims = Some(BTreeMap::from([(
            "mail".to_string(),
            "email".to_string(),
        )]));
        let issuer = TokenIssuer::new(shared_test_keys(), policy);
        let claims = payload(&issuer.issue_identity_token(&user(), &client(), "").unwrap());

        assert_eq!(claims["mail"], json!("admin@example.com"));
        assert!(claims.get("email").is_none());
        assert!(claims.get("role_name").is_none());
        assert!(claims.get("nonce").is_none());
    }

    #[test]
    fn test_empty_identity_mapping_still_suppresses_passthrough() {
        let mut policy = policy();
        policy.identity_claims = Some(BTreeMap::new());
        let issuer = TokenIssuer::new(shared_test_keys(), policy);
        let claims = payload(&issuer.issue_identity_token(&user(), &client(), "").unwrap());
        assert!(claims.get("email").is_none());
    }

    #[test]
    fn test_out_of_range_lifetime_is_an_error() {
        let mut policy = policy();
        policy.access_token_ttl_secs = u64::MAX;
        let issuer = TokenIssuer::new(shared_test_keys(), policy);

        assert!(matches!(
            issuer.issue_access_token(&user(), &client(), ""),
            Err(IdpError::Internal(_))
        ));
        assert!(matches!(
            issuer.issue_identity_token(&user(), &client(), ""),
            Err(IdpError::Internal(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = shared_test_keys();
        let issuer = TokenIssuer::new(keys.clone(), policy());
        let signing_key = keys.current_signing_key();

        let now = Utc::now().timestamp();
        let claims = json!({ "sub": "1", "token_use": "access", "iat": now - 120, "exp": now - 1 });
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(signing_key.kid.clone());
        let token = encode(&header, &claims, signing_key.encoding_key()).unwrap();

        assert!(matches!(
            issuer.validate_access_token(&token),
            Err(IdpError::Authentication(_))
        ));
    }

    #[test]
    fn test_non_rsa_token_is_rejected() {
        let issuer = TokenIssuer::new(shared_test_keys(), policy());
        let now = Utc::now().timestamp();
        let claims = json!({ "sub": "1", "token_use": "access", "exp": now + 600 });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"guessable"),
        )
        .unwrap();

        assert!(issuer.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let issuer = TokenIssuer::new(shared_test_keys(), policy());
        let token = issuer.issue_access_token(&user(), &client(), "").unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = {
            use base64::Engine;
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .encode(br#"{"sub":"2","token_use":"access","exp":9999999999}"#)
        };
        parts[1] = &forged;
        assert!(issuer.validate_access_token(&parts.join(".")).is_err());
    }
}
