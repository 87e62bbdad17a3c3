//! OAuth2 / OpenID Connect HTTP surface
//!
//! Implements:
//! - OpenID Connect Discovery (`/.well-known/openid-configuration`)
//! - JWKS publication (`/.well-known/jwks.json`)
//! - Authorization code flow with a server-rendered login form

pub mod authorize;
pub mod html;
pub mod metadata;
pub mod token;
