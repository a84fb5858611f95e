use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;

/// Tokens are considered expired this long before the issuer says they are.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 300;

/// Bearer token with the instant after which it must not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Builds a cache entry from an issuer's `expires_in`, applying the safety margin.
    pub fn issued(token: String, issued_at: DateTime<Utc>, expires_in_secs: i64) -> Self {
        let usable_for = (expires_in_secs - TOKEN_SAFETY_MARGIN_SECS).max(0);
        Self {
            token,
            expires_at: issued_at + Duration::seconds(usable_for),
        }
    }
}

/// Process-wide bearer token store for the time-to-beat service.
///
/// Injected into the resolver so tests can swap it out. Concurrent refreshes
/// may race; whichever write lands last wins.
pub trait TokenCache: Send + Sync {
    /// Returns the token if it is still valid at `now`.
    fn get(&self, now: DateTime<Utc>) -> Option<String>;

    fn set(&self, token: CachedToken);
}

#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    slot: RwLock<Option<CachedToken>>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCache for InMemoryTokenCache {
    fn get(&self, now: DateTime<Utc>) -> Option<String> {
        let slot = self.slot.read().ok()?;
        slot.as_ref()
            .filter(|cached| now < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    fn set(&self, token: CachedToken) {
        match self.slot.write() {
            Ok(mut slot) => *slot = Some(token),
            Err(poisoned) => *poisoned.into_inner() = Some(token),
        }
    }
}
