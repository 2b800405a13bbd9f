//! Unit tests for the key-value stores and JSON helpers.

use super::*;
use serde::Deserialize;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Sample {
    name: String,
    count: u32,
}

// ============================================================================
// MemoryStore tests
// ============================================================================

#[tokio::test]
async fn test_memory_store_set_get_delete() {
    let store = MemoryStore::new();
    assert!(store.is_empty().await);

    store.set("k", "v1").await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some("v1".to_string()));

    store.set("k", "v2").await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
    assert_eq!(store.len().await, 1);

    store.delete("k").await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_memory_store_delete_missing_key_is_ok() {
    let store = MemoryStore::new();
    assert!(store.delete("missing").await.is_ok());
}

// ============================================================================
// JSON helper tests
// ============================================================================

#[tokio::test]
async fn test_json_helpers_roundtrip_through_store() {
    let store = MemoryStore::new();
    let sample = Sample {
        name: "terms".to_string(),
        count: 3,
    };

    save_json(&store, "sample", &sample).await.unwrap();
    let loaded: Option<Sample> = load_json(&store, "sample").await.unwrap();
    assert_eq!(loaded, Some(sample));
}

#[tokio::test]
async fn test_load_json_missing_key_is_none() {
    let store = MemoryStore::new();
    let loaded: Option<Sample> = load_json(&store, "nothing").await.unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_load_json_corrupt_value_is_serialization_error() {
    let store = MemoryStore::new();
    store.set("sample", "{not json").await.unwrap();

    let result: StorageResult<Option<Sample>> = load_json(&store, "sample").await;
    match result {
        Err(StorageError::Serialization { key, .. }) => assert_eq!(key, "sample"),
        other => panic!("expected serialization error, got {:?}", other),
    }
}

// ============================================================================
// SqliteStore tests
// ============================================================================

#[tokio::test]
async fn test_sqlite_in_memory_upserts_values() {
    let store = SqliteStore::new_in_memory().await.unwrap();

    store.set(keys::USER_ROLE, "regular_user").await.unwrap();
    store.set(keys::USER_ROLE, "shariah_expert").await.unwrap();

    assert_eq!(
        store.get(keys::USER_ROLE).await.unwrap(),
        Some("shariah_expert".to_string())
    );

    store.delete(keys::USER_ROLE).await.unwrap();
    assert_eq!(store.get(keys::USER_ROLE).await.unwrap(), None);
}
