//! Admin panel sessions.
//!
//! Opaque bearer tokens with a fixed lifetime, held in memory only.
//! Expired tokens are swept lazily on validation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Session lifetime.
const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// In-memory session store.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Instant>>,
}

impl SessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new session token.
    #[must_use]
    pub fn create(&self) -> String {
        let token = skyhook_core::ids::secure_token();
        let _ = self
            .sessions
            .lock()
            .insert(token.clone(), Instant::now() + SESSION_TTL);
        token
    }

    /// Whether a token is live. Sweeps expired tokens as a side effect.
    #[must_use]
    pub fn validate(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, expiry| *expiry > now);
        sessions.contains_key(token)
    }

    /// Drop a session (logout).
    pub fn revoke(&self, token: &str) {
        let _ = self.sessions.lock().remove(token);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_validate_revoke() {
        let store = SessionStore::new();
        let token = store.create();
        assert!(store.validate(&token));
        store.revoke(&token);
        assert!(!store.validate(&token));
    }

    #[test]
    fn unknown_and_empty_tokens_fail() {
        let store = SessionStore::new();
        assert!(!store.validate("nope"));
        assert!(!store.validate(""));
    }

    #[test]
    fn tokens_are_unique() {
        let store = SessionStore::new();
        assert_ne!(store.create(), store.create());
    }
}
