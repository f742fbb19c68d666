//! Bearer token supply.
//!
//! Tokens are obtained and refreshed by the host application. This layer only
//! reads the current token before every attempt and fails fast with an auth
//! error when none is usable.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// A bearer token with an optional expiry.
#[derive(Clone)]
pub struct AuthToken {
    secret: String,
    expires_at: Option<Instant>,
}

impl AuthToken {
    /// Creates a token with no known expiry.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    /// Creates a token that expires `expiry_secs` seconds from now.
    pub fn expiring_in(secret: impl Into<String>, expiry_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            expires_at: Some(Instant::now() + Duration::from_secs(expiry_secs)),
        }
    }

    /// The raw token value. Never log this.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Returns true once the expiry has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }

    /// Time left before expiry, `None` if the token does not expire.
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("secret", &"<redacted>")
            .field("expires_in", &self.expires_in())
            .finish()
    }
}

/// Supplies the bearer token attached to each outbound request.
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` if the host has not supplied one.
    fn current_token(&self) -> Option<AuthToken>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(AuthToken);

impl StaticToken {
    pub fn new(token: AuthToken) -> Self {
        Self(token)
    }
}

impl TokenProvider for StaticToken {
    fn current_token(&self) -> Option<AuthToken> {
        Some(self.0.clone())
    }
}

/// A token slot the host updates after refreshing credentials.
///
/// Requests issued after [`set`](Self::set) pick up the new token, including
/// retries of requests that were already in flight.
#[derive(Debug, Default)]
pub struct SharedToken {
    current: RwLock<Option<AuthToken>>,
}

impl SharedToken {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slot holding `token`.
    pub fn with_token(token: AuthToken) -> Self {
        Self {
            current: RwLock::new(Some(token)),
        }
    }

    /// Replaces the current token.
    pub fn set(&self, token: AuthToken) {
        *self.current.write() = Some(token);
    }

    /// Removes the current token.
    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

impl TokenProvider for SharedToken {
    fn current_token(&self) -> Option<AuthToken> {
        self.current.read().clone()
    }
}
