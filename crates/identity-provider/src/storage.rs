//! In-memory flow state: pending login challenges, authorization grants and
//! refresh tokens.
//!
//! Every entry is single-use. Consumers call [`FlowStore::take_if_valid`],
//! which removes the entry under the store's write lock, so two requests
//! racing on the same key can never both receive it. Nothing here survives a
//! restart.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// How long a login challenge stays redeemable, in seconds.
pub const CHALLENGE_TTL_SECS: i64 = 5 * 60;

/// How long an authorization code stays redeemable, in seconds.
pub const AUTHORIZATION_CODE_TTL_SECS: i64 = 10 * 60;

/// A record that knows when it stops being valid.
pub trait Expiring {
    fn is_expired(&self, now: DateTime<Utc>) -> bool;
}

/// A challenge issued by `/login/init`, waiting for `/login/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLoginChallenge {
    pub user_id: String,
    pub client_id: String,
    pub issue_refresh_token: bool,
    pub scopes: String,
    pub created_at: DateTime<Utc>,
}

impl Expiring for PendingLoginChallenge {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(CHALLENGE_TTL_SECS)
    }
}

/// A pending authorization code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    pub user_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub nonce: String,
    pub scopes: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for AuthorizationGrant {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// An issued refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub user_id: String,
    pub client_id: String,
    pub scopes: String,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for RefreshTokenRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Expiring, single-use keyed store.
///
/// Keys are hashed before they are used as map keys, so the raw opaque
/// values handed to clients never sit in memory here.
pub struct FlowStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V: Expiring> FlowStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store a value under `key`, replacing any previous entry.
    pub fn put(&self, key: &str, value: V) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(hash_token(key), value);
    }

    /// Remove and return the entry for `key` if it exists and has not expired.
    ///
    /// An expired entry is removed as well and reported exactly like a
    /// missing one.
    pub fn take_if_valid(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        let taken = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.remove(&hash_token(key))
        };
        taken.filter(|value| !value.is_expired(now))
    }

    /// Remove the entry for `key`. Returns whether anything was removed.
    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&hash_token(key)).is_some()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, value| !value.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live or expired entry exists for `key`, without consuming it.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&hash_token(key))
    }
}

impl<V: Expiring> Default for FlowStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three independent stores behind the login and OAuth2 flows.
#[derive(Default)]
pub struct FlowState {
    pub challenges: FlowStore<PendingLoginChallenge>,
    pub grants: FlowStore<AuthorizationGrant>,
    pub refresh_tokens: FlowStore<RefreshTokenRecord>,
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clean up expired challenges, grants and refresh tokens
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let challenges = self.challenges.sweep_expired(now);
        let grants = self.grants.sweep_expired(now);
        let refresh_tokens = self.refresh_tokens.sweep_expired(now);

        if challenges + grants + refresh_tokens > 0 {
            tracing::info!(
                "Cleaned up {} challenges, {} authorization codes, {} refresh tokens",
                challenges,
                grants,
                refresh_tokens
            );
        }
    }
}

// --- Utility Functions ---

/// `now + lifetime_secs`, or `None` if that is not a representable time.
pub fn expires_after(now: DateTime<Utc>, lifetime_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(lifetime_secs).ok()?;
    now.checked_add_signed(Duration::try_seconds(secs)?)
}

/// Generate an opaque, unguessable token from `len` random bytes.
pub fn generate_random_token_of(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Generate a 32-byte opaque token (challenge ids, codes, refresh tokens, jti).
pub fn generate_random_token() -> String {
    generate_random_token_of(32)
}

/// Hash a token/code for storage (we don't store raw tokens)
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let result = hasher.finalize();
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn refresh_record(expires_at: DateTime<Utc>) -> RefreshTokenRecord {
        RefreshTokenRecord {
            user_id: "u1".to_string(),
            client_id: "client1".to_string(),
            scopes: "openid".to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_take_consumes_entry() {
        let store = FlowStore::new();
        let now = Utc::now();
        store.put("token", refresh_record(now + Duration::hours(1)));

        let taken = store.take_if_valid("token", now).expect("entry should be present");
        assert_eq!(taken.user_id, "u1");
        assert!(store.take_if_valid("token", now).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_entry_is_removed_and_reported_missing() {
        let store = FlowStore::new();
        let now = Utc::now();
        store.put("token", refresh_record(now - Duration::seconds(1)));

        assert!(store.take_if_valid("token", now).is_none());
        assert!(!store.contains("token"));
    }

    #[test]
    fn test_challenge_expires_after_five_minutes() {
        let now = Utc::now();
        let challenge = PendingLoginChallenge {
            user_id: "u1".to_string(),
            client_id: "client1".to_string(),
            issue_refresh_token: false,
            scopes: "openid".to_string(),
            created_at: now - Duration::minutes(5) - Duration::seconds(1),
        };
        assert!(challenge.is_expired(now));
        assert!(!challenge.is_expired(now - Duration::seconds(2)));
    }

    #[test]
    fn test_delete_and_sweep() {
        let store = FlowStore::new();
        let now = Utc::now();
        store.put("live", refresh_record(now + Duration::hours(1)));
        store.put("stale", refresh_record(now - Duration::hours(1)));
        store.put("gone", refresh_record(now + Duration::hours(1)));

        assert!(store.delete("gone"));
        assert!(!store.delete("gone"));
        assert_eq!(store.sweep_expired(now), 1);
        assert_eq!(store.len(), 1);
        assert!(store.contains("live"));
    }

    #[test]
    fn test_raw_keys_are_not_stored() {
        let store = FlowStore::new();
        store.put("secret-token", refresh_record(Utc::now() + Duration::hours(1)));
        let entries = store.entries.read().unwrap();
        assert!(!entries.contains_key("secret-token"));
        assert!(entries.contains_key(&hash_token("secret-token")));
    }

    #[test]
    fn test_concurrent_take_has_exactly_one_winner() {
        const RACERS: usize = 16;

        for _ in 0..20 {
            let store = FlowStore::new();
            let now = Utc::now();
            store.put("contested", refresh_record(now + Duration::hours(1)));
            let barrier = Barrier::new(RACERS);

            let winners = std::thread::scope(|s| {
                let handles: Vec<_> = (0..RACERS)
                    .map(|_| {
                        s.spawn(|| {
                            barrier.wait();
                            store.take_if_valid("contested", now).is_some()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .filter(|won| *won)
                    .count()
            });

            assert_eq!(winners, 1);
        }
    }

    #[test]
    fn test_expires_after_rejects_unrepresentable_lifetimes() {
        let now = Utc::now();
        assert_eq!(expires_after(now, 60), Some(now + Duration::seconds(60)));
        assert!(expires_after(now, 10_000_000_000_000).is_none());
        assert!(expires_after(now, u64::MAX).is_none());
    }

    #[test]
    fn test_generated_tokens_are_unique_and_url_safe() {
        let a = generate_random_token();
        let b = generate_random_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
        assert_eq!(generate_random_token_of(16).len(), 22);
    }
}
