//! Signing key lifecycle and JWKS publication.
//!
//! One RSA-2048 key is generated at startup and lives for the whole process.
//! Tokens are signed with it and verified against it; there is no rotation
//! and no historical key set.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::Serialize;

use crate::error::IdpError;
use crate::storage::generate_random_token_of;

const RSA_KEY_BITS: usize = 2048;

/// The active signing key. Immutable once created.
pub struct SigningKey {
    pub kid: String,
    pub algorithm: Algorithm,
    /// Big-endian modulus bytes
    pub modulus: Vec<u8>,
    /// Big-endian public exponent bytes
    pub exponent: Vec<u8>,
    pub created_at: DateTime<Utc>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKey {
    fn from_private_key(private_key: &RsaPrivateKey) -> Result<Self, IdpError> {
        let der = private_key
            .to_pkcs1_der()
            .map_err(|e| IdpError::Internal(format!("failed to encode signing key: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        let modulus = private_key.n().to_bytes_be();
        let exponent = private_key.e().to_bytes_be();
        let decoding_key = DecodingKey::from_rsa_raw_components(&modulus, &exponent);

        Ok(Self {
            kid: generate_random_token_of(16),
            algorithm: Algorithm::RS256,
            modulus,
            exponent,
            created_at: Utc::now(),
            encoding_key,
            decoding_key,
        })
    }

    /// Private material used to sign tokens.
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Public material used to verify tokens.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Public JWK for this key.
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kid: self.kid.clone(),
            kty: "RSA".to_string(),
            alg: "RS256".to_string(),
            key_use: "sig".to_string(),
            n: URL_SAFE_NO_PAD.encode(&self.modulus),
            e: URL_SAFE_NO_PAD.encode(&self.exponent),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// JSON Web Key (RFC 7517), public part only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Jwk {
    pub kid: String,
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub n: String,
    pub e: String,
}

/// Response body of `/.well-known/jwks.json`
#[derive(Debug, Clone, Serialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Owner of the signing key. Cloning shares the same key.
#[derive(Debug, Clone)]
pub struct KeyRing {
    current: Arc<SigningKey>,
}

impl KeyRing {
    /// Generate a fresh RSA-2048 keypair.
    pub fn generate() -> Result<Self, IdpError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)?;
        let key = SigningKey::from_private_key(&private_key)?;
        tracing::info!("Generated RS256 signing key {}", key.kid);
        Ok(Self {
            current: Arc::new(key),
        })
    }

    pub fn current_signing_key(&self) -> &SigningKey {
        &self.current
    }

    /// Public keys in publication order.
    pub fn public_jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.current.to_jwk()],
        }
    }
}

#[cfg(test)]
pub(crate) fn shared_test_keys() -> KeyRing {
    use std::sync::OnceLock;
    static KEYS: OnceLock<KeyRing> = OnceLock::new();
    KEYS.get_or_init(|| KeyRing::generate().expect("key generation"))
        .clone()
}
