use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StorageResult;
use crate::storage::{keys, KeyValueStore};

/// Source of the bearer token attached to authenticated calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token, if the user is signed in.
    async fn token(&self) -> StorageResult<Option<String>>;
}

/// Fixed token, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// Provider that always returns `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Provider for anonymous calls
    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> StorageResult<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Token written to the key-value store by the authentication layer,
/// falling back to a configured token when nothing is stored.
pub struct StoredToken {
    store: Arc<dyn KeyValueStore>,
    fallback: Option<String>,
}

impl StoredToken {
    /// Read tokens from `store`
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            fallback: None,
        }
    }

    /// Use `token` when the store holds none
    pub fn with_fallback(mut self, token: Option<String>) -> Self {
        self.fallback = token;
        self
    }
}

#[async_trait]
impl TokenProvider for StoredToken {
    async fn token(&self) -> StorageResult<Option<String>> {
        let stored = self
            .store
            .get(keys::AUTH_TOKEN)
            .await?
            .filter(|t| !t.trim().is_empty());
        Ok(stored.or_else(|| self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(
            StaticToken::new("abc").token().await.unwrap(),
            Some("abc".to_string())
        );
        assert_eq!(StaticToken::none().token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stored_token_prefers_store_over_fallback() {
        let store = Arc::new(MemoryStore::new());
        let provider = StoredToken::new(store.clone()).with_fallback(Some("config".to_string()));

        assert_eq!(provider.token().await.unwrap(), Some("config".to_string()));

        store.set(keys::AUTH_TOKEN, "signed-in").await.unwrap();
        assert_eq!(provider.token().await.unwrap(), Some("signed-in".to_string()));
    }
}
