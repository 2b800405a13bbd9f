//! Background writer for the current-session snapshot.
//!
//! State changes enqueue commands on an unbounded channel; a single task
//! applies them to the store in order, so the stored snapshot always follows
//! the last committed state and a clear is never overtaken by an older save.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::term::Term;
use crate::error::StorageResult;
use crate::history::SessionRecord;
use crate::storage::{keys, load_json, save_json, KeyValueStore};

/// The persisted subset of session state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub session_id: String,
    pub terms: Vec<Term>,
    pub meta: Option<SessionRecord>,
}

enum Command {
    Save(Box<Snapshot>),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task.
pub(crate) struct SnapshotWriter {
    tx: mpsc::UnboundedSender<Command>,
}

impl SnapshotWriter {
    /// Spawn the writer task on the current runtime
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, rx));
        Self { tx }
    }

    pub fn save(&self, snapshot: Snapshot) {
        self.send(Command::Save(Box::new(snapshot)));
    }

    pub fn clear(&self) {
        self.send(Command::Clear);
    }

    /// Wait until every command enqueued so far has been applied.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.send(Command::Flush(done));
        let _ = wait.await;
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("Snapshot writer stopped, dropping persistence command");
        }
    }
}

async fn run(store: Arc<dyn KeyValueStore>, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Save(snapshot) => {
                if let Err(e) = write(store.as_ref(), &snapshot).await {
                    warn!(
                        session_id = %snapshot.session_id,
                        error = %e,
                        "Failed to persist session snapshot"
                    );
                }
            }
            Command::Clear => {
                if let Err(e) = erase(store.as_ref()).await {
                    warn!(error = %e, "Failed to erase session snapshot");
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Snapshot writer finished");
}

async fn write(store: &dyn KeyValueStore, snapshot: &Snapshot) -> StorageResult<()> {
    store
        .set(keys::CURRENT_SESSION_ID, &snapshot.session_id)
        .await?;
    save_json(store, keys::CURRENT_TERMS, &snapshot.terms).await?;
    match &snapshot.meta {
        Some(meta) => save_json(store, keys::CURRENT_DETAILS, meta).await,
        None => store.delete(keys::CURRENT_DETAILS).await,
    }
}

async fn erase(store: &dyn KeyValueStore) -> StorageResult<()> {
    store.delete(keys::CURRENT_SESSION_ID).await?;
    store.delete(keys::CURRENT_TERMS).await?;
    store.delete(keys::CURRENT_DETAILS).await
}

/// Read a previously persisted snapshot.
///
/// Returns `None` unless both the id and the terms are present and readable;
/// unreadable metadata is dropped on its own.
pub async fn read_snapshot(store: &dyn KeyValueStore) -> Option<Snapshot> {
    let session_id = match store.get(keys::CURRENT_SESSION_ID).await {
        Ok(Some(id)) if !id.is_empty() => id,
        Ok(_) => return None,
        Err(e) => {
            warn!(error = %e, "Failed to read persisted session id");
            return None;
        }
    };

    let terms = match load_json::<Vec<Term>>(store, keys::CURRENT_TERMS).await {
        Ok(Some(terms)) => terms,
        Ok(None) => return None,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Persisted terms unreadable");
            return None;
        }
    };

    let meta = load_json::<SessionRecord>(store, keys::CURRENT_DETAILS)
        .await
        .unwrap_or_else(|e| {
            warn!(session_id = %session_id, error = %e, "Persisted session details unreadable");
            None
        });

    Some(Snapshot {
        session_id,
        terms,
        meta,
    })
}
