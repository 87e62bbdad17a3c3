//! Configuration loading and management

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::directory::{Client, User};

/// Main configuration for the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port to listen on (default: 8080, `PORT` overrides)
    #[serde(default)]
    pub port: u16,

    /// `iss` claim of every token (default: http://localhost:{port})
    #[serde(default)]
    pub issuer: String,

    /// Public URL used to build discovery endpoints (default: http://localhost:{port})
    #[serde(default)]
    pub base_url: String,

    /// Access and identity token lifetime in seconds (default: 15 minutes)
    #[serde(default)]
    pub access_token_expiration_seconds: u64,

    /// Refresh token lifetime in seconds (default: 1 day)
    #[serde(default)]
    pub refresh_token_expiration_seconds: u64,

    /// CORS origins: "*" or a comma-separated list
    #[serde(default)]
    pub allowed_origins: String,

    /// Access token claim name -> user attribute name
    #[serde(default)]
    pub map_access_token_claims: Option<BTreeMap<String, String>>,

    /// Identity token claim name -> user attribute name. When unset, every
    /// user attribute is copied into the identity token.
    #[serde(default)]
    pub map_identity_token_claims: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub oauth2: OAuth2Config,

    #[serde(default)]
    pub login_api: LoginApiConfig,

    #[serde(default)]
    pub users: Vec<User>,

    #[serde(default)]
    pub clients: Vec<Client>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    /// Mount the `/oauth2/*` endpoints
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Require the extra challenge field on the login form
    #[serde(default)]
    pub require_challenge_on_login: bool,

    #[serde(default = "default_scopes")]
    pub default_scopes: String,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            require_challenge_on_login: false,
            default_scopes: default_scopes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginApiConfig {
    /// Mount the `/login/*` endpoints
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_scopes")]
    pub default_scopes: String,
}

impl Default for LoginApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_scopes: default_scopes(),
        }
    }
}

pub const DEFAULT_PORT: u16 = 8080;

/// Longest accepted access or refresh token lifetime (ten years).
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_true() -> bool {
    true
}

fn default_scopes() -> String {
    "openid profile".to_string()
}

fn default_access_token_lifetime() -> u64 {
    900 // 15 minutes
}

fn default_refresh_token_lifetime() -> u64 {
    86400 // 1 day
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            port: 0,
            issuer: String::new(),
            base_url: String::new(),
            access_token_expiration_seconds: 0,
            refresh_token_expiration_seconds: 0,
            allowed_origins: String::new(),
            map_access_token_claims: None,
            map_identity_token_claims: None,
            oauth2: OAuth2Config::default(),
            login_api: LoginApiConfig::default(),
            users: Vec::new(),
            clients: Vec::new(),
        };
        config.apply_defaults();
        config
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file is not an error: the service starts with defaults and
    /// no users or clients. A file that cannot be parsed is.
    pub fn load(config_path: &str) -> Result<Self> {
        let config_file = Path::new(config_path);

        let mut config = if config_file.exists() {
            let content = std::fs::read_to_string(config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config = Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse {:?}", config_file))?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            config
        } else {
            tracing::warn!(
                "No config file found at {:?}, using defaults",
                config_file
            );
            Config::default()
        };

        config.apply_defaults();
        Ok(config)
    }

    /// Parse a YAML document and fill in defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot be turned into token expiry times.
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            (
                "access_token_expiration_seconds",
                self.access_token_expiration_seconds,
            ),
            (
                "refresh_token_expiration_seconds",
                self.refresh_token_expiration_seconds,
            ),
        ] {
            if value > MAX_TOKEN_LIFETIME_SECS {
                bail!(
                    "{} must be at most {} seconds, got {}",
                    name,
                    MAX_TOKEN_LIFETIME_SECS,
                    value
                );
            }
        }
        Ok(())
    }

    /// Override the listening port, recomputing URLs that were derived from it.
    pub fn override_port(&mut self, port: u16) {
        let derived = format!("http://localhost:{}", self.port);
        if self.issuer == derived {
            self.issuer.clear();
        }
        if self.base_url == derived {
            self.base_url.clear();
        }
        self.port = port;
        self.apply_defaults();
    }

    /// Fill every unset field with its default.
    fn apply_defaults(&mut self) {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.base_url.is_empty() {
            self.base_url = format!("http://localhost:{}", self.port);
        }
        if self.issuer.is_empty() {
            self.issuer = format!("http://localhost:{}", self.port);
        }
        if self.access_token_expiration_seconds == 0 {
            self.access_token_expiration_seconds = default_access_token_lifetime();
        }
        if self.refresh_token_expiration_seconds == 0 {
            self.refresh_token_expiration_seconds = default_refresh_token_lifetime();
        }
        if self.allowed_origins.is_empty() {
            self.allowed_origins = "*".to_string();
        }
        if self.oauth2.default_scopes.is_empty() {
            self.oauth2.default_scopes = default_scopes();
        }
        if self.login_api.default_scopes.is_empty() {
            self.login_api.default_scopes = default_scopes();
        }
    }

    /// Configured CORS origins, or `None` when any origin is allowed.
    pub fn cors_origins(&self) -> Option<Vec<String>> {
        if self.allowed_origins.trim() == "*" {
            return None;
        }
        Some(
            self.allowed_origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.issuer, "http://localhost:8080");
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.access_token_expiration_seconds, 900);
        assert_eq!(config.refresh_token_expiration_seconds, 86400);
        assert!(config.oauth2.enabled);
        assert!(!config.oauth2.require_challenge_on_login);
        assert_eq!(config.oauth2.default_scopes, "openid profile");
        assert!(config.login_api.enabled);
        assert_eq!(config.login_api.default_scopes, "openid profile");
        assert!(config.map_identity_token_claims.is_none());
        assert_eq!(config.cors_origins(), None);
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
port: 9000
issuer: https://idp.example.com
access_token_expiration_seconds: 1
allowed_origins: "http://localhost:3000, http://example.com"
map_access_token_claims:
  roles: role_name
map_identity_token_claims: {}
oauth2:
  enabled: false
  require_challenge_on_login: true
login_api:
  default_scopes: openid email
users:
  - id: "1"
    username: admin
    password: admin123
    attributes:
      role_name: administrator
      level: 3
      tags: [a, b]
clients:
  - id: client1
    secret: super_secret
    redirect_uri: http://localhost:3000/callback
    audience: api
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.issuer, "https://idp.example.com");
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.access_token_expiration_seconds, 1);
        assert_eq!(
            config.cors_origins(),
            Some(vec![
                "http://localhost:3000".to_string(),
                "http://example.com".to_string()
            ])
        );
        assert_eq!(
            config.map_access_token_claims.as_ref().unwrap()["roles"],
            "role_name"
        );
        assert!(config.map_identity_token_claims.as_ref().unwrap().is_empty());
        assert!(!config.oauth2.enabled);
        assert!(config.oauth2.require_challenge_on_login);
        assert_eq!(config.oauth2.default_scopes, "openid profile");
        assert_eq!(config.login_api.default_scopes, "openid email");

        let user = &config.users[0];
        assert_eq!(user.password, "admin123");
        assert!(!user.disabled);
        assert_eq!(user.attributes["level"], serde_json::json!(3));
        assert_eq!(user.attributes["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(config.clients[0].audience, "api");
    }

    #[test]
    fn test_port_override_updates_derived_urls() {
        let mut config = Config::from_yaml("issuer: https://idp.example.com").unwrap();
        config.override_port(7070);
        assert_eq!(config.port, 7070);
        assert_eq!(config.base_url, "http://localhost:7070");
        assert_eq!(config.issuer, "https://idp.example.com");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/identity-provider.yaml").unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"port: 9090\nlogin_api:\n  enabled: false\n").unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.issuer, "http://localhost:9090");
        assert!(!config.login_api.enabled);
        assert!(config.oauth2.enabled);
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"users: {{{").unwrap();
        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_token_lifetimes_are_bounded() {
        for field in [
            "access_token_expiration_seconds",
            "refresh_token_expiration_seconds",
        ] {
            let at_limit = format!("{}: {}", field, MAX_TOKEN_LIFETIME_SECS);
            assert!(Config::from_yaml(&at_limit).is_ok(), "{field} at limit");

            let over = format!("{}: {}", field, MAX_TOKEN_LIFETIME_SECS + 1);
            let err = Config::from_yaml(&over).unwrap_err();
            assert!(err.to_string().contains(field), "{err}");

            let huge = format!("{}: {}", field, u64::MAX);
            assert!(Config::from_yaml(&huge).is_err(), "{field} at u64::MAX");
        }
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(Config::from_yaml("port: [not a number").is_err());
    }
}
