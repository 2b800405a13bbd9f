//! Append-only log of user actions.
//!
//! Entries are kept newest-first in memory and the whole list is persisted
//! under a single key after every append. Persistence is best-effort: a
//! failed write is logged and otherwise ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::storage::{keys, load_json, save_json, KeyValueStore};

/// Kind of logged action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// A question about a term or the whole contract.
    QuestionAsked,
    /// A reviewed or confirmed wording change.
    TermModified,
    /// A modified or marked document was generated.
    ContractGenerated,
    /// An expert assessment was submitted.
    ExpertFeedback,
}

impl std::fmt::Display for InteractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionType::QuestionAsked => write!(f, "question_asked"),
            InteractionType::TermModified => write!(f, "term_modified"),
            InteractionType::ContractGenerated => write!(f, "contract_generated"),
            InteractionType::ExpertFeedback => write!(f, "expert_feedback"),
        }
    }
}

/// One immutable log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Durable audit trail shared by the session store and local history.
pub struct InteractionLog {
    store: Arc<dyn KeyValueStore>,
    entries: RwLock<Vec<Interaction>>,
}

impl InteractionLog {
    /// Empty log writing to `store`
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Open the log, loading previously persisted entries.
    ///
    /// Missing or corrupt data starts an empty log.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let entries = match load_json::<Vec<Interaction>>(store.as_ref(), keys::INTERACTIONS).await
        {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load interaction log, starting empty");
                Vec::new()
            }
        };
        debug!(entries = entries.len(), "Interaction log loaded");

        Self {
            store,
            entries: RwLock::new(entries),
        }
    }

    /// Prepend a timestamped entry and persist the log.
    pub async fn record(
        &self,
        session_id: &str,
        kind: InteractionType,
        term_id: Option<&str>,
        data: Option<serde_json::Value>,
    ) -> Interaction {
        let interaction = Interaction {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            kind,
            term_id: term_id.map(str::to_string),
            data,
        };

        // The write guard is held across the save so that concurrent appends
        // reach the store in the same order they were applied in memory.
        let mut entries = self.entries.write().await;
        entries.insert(0, interaction.clone());
        if let Err(e) = save_json(self.store.as_ref(), keys::INTERACTIONS, &*entries).await {
            warn!(
                session_id = %session_id,
                kind = %kind,
                error = %e,
                "Failed to persist interaction log"
            );
        }

        interaction
    }

    /// Entries of one session, newest first.
    pub async fn query_by_session(&self, session_id: &str) -> Vec<Interaction> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|i| i.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Drop every entry of one session and persist.
    pub async fn remove_session(&self, session_id: &str) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|i| i.session_id != session_id);
        if entries.len() == before {
            return;
        }
        if let Err(e) = save_json(self.store.as_ref(), keys::INTERACTIONS, &*entries).await {
            warn!(session_id = %session_id, error = %e, "Failed to persist interaction log");
        }
    }

    /// Total number of entries across sessions
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the log holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Per-session figures derived from the log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionActivity {
    entries: Vec<Interaction>,
}

impl SessionActivity {
    /// Wrap newest-first entries of one session
    pub fn new(entries: Vec<Interaction>) -> Self {
        Self { entries }
    }

    /// Number of logged actions
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Timestamp of the newest action
    pub fn last_interaction_time(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|i| i.timestamp).max()
    }

    /// Number of logged actions on one term
    pub fn term_count(&self, term_id: &str) -> usize {
        self.entries
            .iter()
            .filter(|i| i.term_id.as_deref() == Some(term_id))
            .count()
    }

    /// Timestamp of the newest wording change on one term
    pub fn term_last_modified(&self, term_id: &str) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .filter(|i| {
                i.term_id.as_deref() == Some(term_id) && i.kind == InteractionType::TermModified
            })
            .map(|i| i.timestamp)
            .max()
    }
}
