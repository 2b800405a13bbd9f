//! Persisted key-value storage.
//!
//! Everything the client keeps across restarts (the current session snapshot,
//! local history, the interaction log, the user role) is stored as whole JSON
//! values under fixed keys. Writers own distinct keys, so every write is a
//! plain overwrite and no transactions are needed.

mod memory;
mod sqlite;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StorageError, StorageResult};

/// Logical keys used by the client.
pub mod keys {
    /// Id of the session currently being worked on.
    pub const CURRENT_SESSION_ID: &str = "current_session_id";
    /// Serialized term collection of the current session.
    pub const CURRENT_TERMS: &str = "current_analysis_terms";
    /// Serialized metadata of the current session.
    pub const CURRENT_DETAILS: &str = "current_session_details";
    /// Bounded list of past sessions.
    pub const SESSION_HISTORY: &str = "session_history";
    /// Append-only interaction log.
    pub const INTERACTIONS: &str = "session_interactions";
    /// Preferred user role.
    pub const USER_ROLE: &str = "user_role";
    /// Bearer token written by the authentication layer.
    pub const AUTH_TOKEN: &str = "auth_token";
}

/// Generic async key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;
    /// Overwrite the value stored under `key`.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Read and decode a JSON value.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, &raw).await
}
