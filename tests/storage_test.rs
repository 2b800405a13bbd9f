//! Integration tests for the SQLite key-value store
//!
//! Tests persistence against in-memory and on-disk databases.

use std::sync::Arc;

use compliance_session::config::DatabaseConfig;
use compliance_session::gateway::SessionDetails;
use compliance_session::history::LocalHistory;
use compliance_session::interactions::{InteractionLog, InteractionType};
use compliance_session::storage::{keys, load_json, save_json, KeyValueStore, SqliteStore};

/// Create an in-memory store for testing
async fn create_test_store() -> SqliteStore {
    SqliteStore::new_in_memory()
        .await
        .expect("Failed to create in-memory store")
}

#[cfg(test)]
mod kv_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = create_test_store().await;
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = create_test_store().await;

        store.set(keys::USER_ROLE, "regular_user").await.unwrap();
        store.set(keys::USER_ROLE, "shariah_expert").await.unwrap();

        assert_eq!(
            store.get(keys::USER_ROLE).await.unwrap().as_deref(),
            Some("shariah_expert")
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = create_test_store().await;
        store.set(keys::CURRENT_SESSION_ID, "S1").await.unwrap();

        store.delete(keys::CURRENT_SESSION_ID).await.unwrap();
        store.delete(keys::CURRENT_SESSION_ID).await.unwrap();

        assert_eq!(store.get(keys::CURRENT_SESSION_ID).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = create_test_store().await;
        let details = SessionDetails::new("S1");

        save_json(&store, keys::CURRENT_DETAILS, &details).await.unwrap();
        let loaded: Option<SessionDetails> = load_json(&store, keys::CURRENT_DETAILS).await.unwrap();

        assert_eq!(loaded, Some(details));
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("session.db"),
            max_connections: 2,
        };

        {
            let store = SqliteStore::new(&config).await.unwrap();
            store.set(keys::AUTH_TOKEN, "token-1").await.unwrap();
            store.pool().close().await;
        }

        let reopened = SqliteStore::new(&config).await.unwrap();
        assert_eq!(
            reopened.get(keys::AUTH_TOKEN).await.unwrap().as_deref(),
            Some("token-1")
        );
    }

    #[tokio::test]
    async fn test_history_and_log_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("session.db"),
            max_connections: 2,
        };

        {
            let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(&config).await.unwrap());
            let interactions = Arc::new(InteractionLog::new(store.clone()));
            let history = LocalHistory::new(store.clone(), interactions.clone());

            interactions
                .record("S1", InteractionType::QuestionAsked, Some("t1"), None)
                .await;
            history.upsert(&SessionDetails::new("S1")).await.unwrap();
        }

        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(&config).await.unwrap());
        let interactions = Arc::new(InteractionLog::load(store.clone()).await);
        let history = LocalHistory::new(store, interactions.clone());

        assert_eq!(interactions.query_by_session("S1").await.len(), 1);
        let entry = history.get("S1").await.unwrap();
        assert_eq!(entry.total_interactions, 1);

        history.remove("S1").await.unwrap();
        assert!(history.list().await.is_empty());
        assert!(interactions.is_empty().await);
    }
}
