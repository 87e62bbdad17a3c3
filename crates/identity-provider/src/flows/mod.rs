//! Request-level protocols.
//!
//! Each flow validates its inputs against the directories, mutates at most
//! one flow store entry, and asks the token issuer for signed tokens. The
//! HTTP handlers in `oauth` and `login` are thin wrappers around these.

pub mod authorization_code;
pub mod challenge_login;
pub mod refresh;

use chrono::{DateTime, Utc};

use crate::error::IdpError;
use crate::storage::expires_after;
use crate::AppState;

/// Expiry for a refresh token minted at `now`.
///
/// Callers work this out before consuming anything, so a bad lifetime
/// leaves the presented challenge or token in place.
pub(crate) fn refresh_token_expiry(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, IdpError> {
    let lifetime = state.config.refresh_token_expiration_seconds;
    expires_after(now, lifetime).ok_or_else(|| {
        IdpError::Internal(format!("refresh token lifetime {lifetime}s is out of range"))
    })
}
