//! Application wiring.
//!
//! Builds the dependency graph once at startup: persistent store, token
//! provider, gateway client, interaction log, local history and the session
//! store, which is restored from its last snapshot before use.

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::AppResult;
use crate::gateway::{ApiClient, ComplianceApi, StoredToken};
use crate::history::LocalHistory;
use crate::interactions::InteractionLog;
use crate::session::SessionStore;
use crate::storage::{KeyValueStore, SqliteStore};

/// Shared application state.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Persistent key-value store.
    pub store: Arc<dyn KeyValueStore>,
    /// Audit trail of user actions.
    pub interactions: Arc<InteractionLog>,
    /// Locally saved sessions.
    pub history: Arc<LocalHistory>,
    /// The active session.
    pub session: SessionStore,
}

impl AppState {
    /// Open the database, build the HTTP client and restore the last session.
    pub async fn initialize(config: Config) -> AppResult<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(&config.database).await?);
        info!(path = %config.database.path.display(), "Database initialized");

        let tokens = StoredToken::new(store.clone()).with_fallback(config.api.auth_token.clone());
        let client = ApiClient::new(&config.api, config.request.clone(), Arc::new(tokens))?;
        info!(base_url = %client.base_url(), "API client initialized");

        Ok(Self::assemble(config, store, Arc::new(client)).await)
    }

    /// Build the state around an existing store and gateway.
    pub async fn assemble(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn ComplianceApi>,
    ) -> Self {
        let interactions = Arc::new(InteractionLog::load(store.clone()).await);
        let history = Arc::new(LocalHistory::new(store.clone(), interactions.clone()));
        let session = SessionStore::new(api, store.clone(), interactions.clone(), history.clone());

        if session.restore().await {
            info!(session_id = ?session.session_id(), "Resuming previous session");
        }

        Self {
            config,
            store,
            interactions,
            history,
            session,
        }
    }
}
