//! Credential source for console sessions.
//!
//! The console never owns the bearer token. It reads it from a
//! [`CredentialSource`] when a session is opened and again on every manual
//! reconnect, so a token refreshed elsewhere in the application is honoured.

use parking_lot::RwLock;
use std::sync::Arc;

/// Read-only access to the current bearer token.
pub trait CredentialSource {
    fn token(&self) -> Option<String>;
}

/// Application-wide token store shared between the login flow and consoles.
///
/// Cloning is cheap and every clone observes the same token.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl CredentialSource for TokenStore {
    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

/// Returns the token only if it has non-whitespace content.
pub fn usable_token(token: Option<&str>) -> Option<&str> {
    token.filter(|token| !token.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_shared_between_clones() {
        let store = TokenStore::new();
        let reader = store.clone();
        assert_eq!(reader.token(), None);

        store.set("abc");
        assert_eq!(reader.token().as_deref(), Some("abc"));

        store.clear();
        assert_eq!(reader.token(), None);
    }

    #[test]
    fn test_usable_token() {
        assert_eq!(usable_token(Some("abc")), Some("abc"));
        assert_eq!(usable_token(Some("")), None);
        assert_eq!(usable_token(Some("  \t\n")), None);
        assert_eq!(usable_token(None), None);
    }
}
