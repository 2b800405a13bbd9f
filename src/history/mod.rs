//! Bounded local history of analyzed sessions.
//!
//! History lives in the key-value store independently of the live session,
//! so a user can resume or delete past analyses. The list is capped at
//! [`HISTORY_LIMIT`] entries, newest first, keyed by session id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StorageResult;
use crate::gateway::SessionDetails;
use crate::interactions::{InteractionLog, SessionActivity};
use crate::storage::{keys, load_json, save_json, KeyValueStore};

/// Maximum number of sessions kept locally.
pub const HISTORY_LIMIT: usize = 50;

/// Session metadata plus interaction-derived totals.
///
/// Used both as the live session's metadata and as a history entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(flatten)]
    pub details: SessionDetails,
    #[serde(default)]
    pub total_interactions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_bookmarked: bool,
}

impl SessionRecord {
    /// Record for `details` annotated with `activity`
    pub fn new(details: SessionDetails, activity: &SessionActivity) -> Self {
        Self {
            details,
            total_interactions: activity.total(),
            last_interaction_time: activity.last_interaction_time(),
            is_bookmarked: false,
        }
    }

    /// Id of the recorded session
    pub fn session_id(&self) -> &str {
        &self.details.session_id
    }
}

/// Persisted list of past sessions.
pub struct LocalHistory {
    store: Arc<dyn KeyValueStore>,
    interactions: Arc<InteractionLog>,
    // Serializes read-modify-write cycles on the history key.
    write_lock: Mutex<()>,
}

impl LocalHistory {
    /// History backed by `store`; removals cascade into `interactions`
    pub fn new(store: Arc<dyn KeyValueStore>, interactions: Arc<InteractionLog>) -> Self {
        Self {
            store,
            interactions,
            write_lock: Mutex::new(()),
        }
    }

    /// Stored entries, newest first. Missing or corrupt data reads as empty.
    pub async fn list(&self) -> Vec<SessionRecord> {
        match load_json::<Vec<SessionRecord>>(self.store.as_ref(), keys::SESSION_HISTORY).await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to read session history, treating as empty");
                Vec::new()
            }
        }
    }

    /// Entry for one session
    pub async fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.list()
            .await
            .into_iter()
            .find(|e| e.session_id() == session_id)
    }

    /// Save a session at the front, replacing any entry with the same id.
    ///
    /// The bookmark flag of a replaced entry is preserved.
    pub async fn upsert(&self, details: &SessionDetails) -> StorageResult<()> {
        let activity =
            SessionActivity::new(self.interactions.query_by_session(&details.session_id).await);
        let mut record = SessionRecord::new(details.clone(), &activity);

        let _guard = self.write_lock.lock().await;
        let mut entries = self.list().await;
        if let Some(pos) = entries.iter().position(|e| e.session_id() == record.session_id()) {
            record.is_bookmarked = entries.remove(pos).is_bookmarked;
        }
        entries.insert(0, record);
        entries.truncate(HISTORY_LIMIT);

        save_json(self.store.as_ref(), keys::SESSION_HISTORY, &entries).await?;
        debug!(
            session_id = %details.session_id,
            entries = entries.len(),
            "Session saved to history"
        );
        Ok(())
    }

    /// Delete a session and its interaction log entries.
    pub async fn remove(&self, session_id: &str) -> StorageResult<()> {
        {
            let _guard = self.write_lock.lock().await;
            let mut entries = self.list().await;
            entries.retain(|e| e.session_id() != session_id);
            save_json(self.store.as_ref(), keys::SESSION_HISTORY, &entries).await?;
        }

        self.interactions.remove_session(session_id).await;
        info!(session_id = %session_id, "Session removed from history");
        Ok(())
    }

    /// Flip the bookmark flag of an entry. Returns the new flag, or `None`
    /// when the session is not in history.
    pub async fn toggle_bookmark(&self, session_id: &str) -> StorageResult<Option<bool>> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.list().await;

        let flag = match entries.iter_mut().find(|e| e.session_id() == session_id) {
            Some(entry) => {
                entry.is_bookmarked = !entry.is_bookmarked;
                entry.is_bookmarked
            }
            None => return Ok(None),
        };

        save_json(self.store.as_ref(), keys::SESSION_HISTORY, &entries).await?;
        Ok(Some(flag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactions::InteractionType;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn history() -> (LocalHistory, Arc<MemoryStore>, Arc<InteractionLog>) {
        let store = Arc::new(MemoryStore::new());
        let interactions = Arc::new(InteractionLog::new(store.clone()));
        (
            LocalHistory::new(store.clone(), interactions.clone()),
            store,
            interactions,
        )
    }

    fn ids(entries: &[SessionRecord]) -> Vec<String> {
        entries.iter().map(|e| e.session_id().to_string()).collect()
    }

    #[tokio::test]
    async fn test_upsert_prepends_new_sessions() {
        let (history, _, _) = history();
        history.upsert(&SessionDetails::new("S1")).await.unwrap();
        history.upsert(&SessionDetails::new("S2")).await.unwrap();

        assert_eq!(ids(&history.list().await), vec!["S2", "S1"]);
    }

    #[tokio::test]
    async fn test_upsert_existing_moves_to_front_and_replaces() {
        let (history, _, _) = history();
        history.upsert(&SessionDetails::new("S1")).await.unwrap();
        history.upsert(&SessionDetails::new("S2")).await.unwrap();

        let mut updated = SessionDetails::new("S1");
        updated.original_filename = "renamed.pdf".to_string();
        history.upsert(&updated).await.unwrap();

        let entries = history.list().await;
        assert_eq!(ids(&entries), vec!["S1", "S2"]);
        assert_eq!(entries[0].details.original_filename, "renamed.pdf");
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let (history, _, _) = history();
        for i in 0..60 {
            history
                .upsert(&SessionDetails::new(format!("S{}", i)))
                .await
                .unwrap();
        }

        let entries = history.list().await;
        assert_eq!(entries.len(), HISTORY_LIMIT);
        assert_eq!(entries[0].session_id(), "S59");
        assert_eq!(entries[HISTORY_LIMIT - 1].session_id(), "S10");
    }

    #[tokio::test]
    async fn test_upsert_annotates_interaction_totals() {
        let (history, _, interactions) = history();
        interactions
            .record("S1", InteractionType::QuestionAsked, None, None)
            .await;
        interactions
            .record("S1", InteractionType::TermModified, Some("t1"), None)
            .await;

        history.upsert(&SessionDetails::new("S1")).await.unwrap();

        let entry = history.get("S1").await.unwrap();
        assert_eq!(entry.total_interactions, 2);
        assert!(entry.last_interaction_time.is_some());
    }

    #[tokio::test]
    async fn test_remove_cascades_to_interactions() {
        let (history, _, interactions) = history();
        interactions
            .record("S1", InteractionType::QuestionAsked, None, None)
            .await;
        history.upsert(&SessionDetails::new("S1")).await.unwrap();

        history.remove("S1").await.unwrap();

        assert!(history.list().await.is_empty());
        assert!(interactions.query_by_session("S1").await.is_empty());
    }

    #[tokio::test]
    async fn test_list_corrupt_storage_is_empty() {
        let (history, store, _) = history();
        store.set(keys::SESSION_HISTORY, "[{broken").await.unwrap();

        assert!(history.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_bookmark() {
        let (history, _, _) = history();
        history.upsert(&SessionDetails::new("S1")).await.unwrap();

        assert_eq!(history.toggle_bookmark("S1").await.unwrap(), Some(true));
        assert!(history.get("S1").await.unwrap().is_bookmarked);

        // Re-saving keeps the bookmark
        history.upsert(&SessionDetails::new("S1")).await.unwrap();
        assert!(history.get("S1").await.unwrap().is_bookmarked);

        assert_eq!(history.toggle_bookmark("S1").await.unwrap(), Some(false));
        assert_eq!(history.toggle_bookmark("missing").await.unwrap(), None);
    }
}
