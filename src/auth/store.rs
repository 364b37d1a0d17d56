//! Token Storage
//!
//! The access/refresh pair lives under the same keys the web client used
//! in local storage (`authToken`, `refreshToken`).

use crate::database::DatabaseError;
use parking_lot::RwLock;

pub const ACCESS_TOKEN_KEY: &str = "authToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Access + refresh token as issued by `/login/`
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Persistence for the signed-in user's tokens
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<TokenPair>, DatabaseError>;
    fn save(&self, tokens: &TokenPair) -> Result<(), DatabaseError>;
    fn clear(&self) -> Result<(), DatabaseError>;
}

/// Process-local store, forgotten on exit
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenPair>, DatabaseError> {
        Ok(self.tokens.read().clone())
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), DatabaseError> {
        *self.tokens.write() = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), DatabaseError> {
        *self.tokens.write() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip_and_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.load().unwrap().is_none());

        let pair = TokenPair {
            access: "a".into(),
            refresh: "r".into(),
        };
        store.save(&pair).unwrap();
        assert_eq!(store.load().unwrap(), Some(pair));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_debug_never_prints_tokens() {
        let pair = TokenPair {
            access: "secret-access".into(),
            refresh: "secret-refresh".into(),
        };
        let printed = format!("{pair:?}");
        assert!(!printed.contains("secret"));
    }
}
