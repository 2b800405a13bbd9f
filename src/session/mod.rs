//! Client-side store for the active contract-review session.
//!
//! [`SessionStore`] is the single source of truth for the current session:
//! its id, terms, metadata, in-flight flags and error slots. Every
//! operation goes through the gateway, merges the result into the state,
//! logs an interaction and schedules a snapshot write.
//!
//! Concurrency rules:
//! - At most one operation per term is in flight; a second request on a busy
//!   term is dropped without a network call.
//! - Results that arrive after `clear_session` or a switch to another session
//!   are discarded. Each mutation captures the clear generation (`epoch`) and
//!   the session id it started under and re-checks both before applying.
//! - State is guarded by a synchronous mutex that is never held across an
//!   await, so progress callbacks can update it from any thread.

mod persist;
mod state;
mod stats;
mod term;


pub use persist::{read_snapshot, Snapshot};
pub use state::{SessionState, TermActivity, UserRole};
pub use stats::ComplianceStats;
pub use term::Term;

use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::ValidationError;
use crate::gateway::{
    CandidateFile, ComplianceApi, ConfirmRequest, ContractKind, ExpertFeedbackPayload, FileInfo,
    GenerateResponse, GeneratedContractInfo, ProgressSink, QuestionRequest, ReviewRequest,
    SessionDetails, UploadStage, UserStats,
};
use crate::history::{LocalHistory, SessionRecord};
use crate::interactions::{InteractionLog, InteractionType, SessionActivity};
use crate::storage::{keys, KeyValueStore};
use persist::SnapshotWriter;

struct Inner {
    state: SessionState,
    /// Bumped by every clear.
    epoch: u64,
    /// Bumped by every load request; only the newest load may apply.
    load_seq: u64,
    /// Bumped by every mutation; published to subscribers.
    version: u64,
}

impl Inner {
    fn is_current(&self, ticket: &Ticket) -> bool {
        self.epoch == ticket.epoch && self.state.session_id.as_deref() == Some(&ticket.session_id)
    }

    fn snapshot(&self) -> Option<Snapshot> {
        Some(Snapshot {
            session_id: self.state.session_id.clone()?,
            terms: self.state.terms.clone()?,
            meta: self.state.meta.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    /// Flags or error slots only.
    Flags,
    /// Persisted fields (id, terms, metadata).
    Data,
}

struct Shared {
    inner: Mutex<Inner>,
    writer: SnapshotWriter,
    changes: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` under the lock, then notify subscribers and, for data
    /// changes, enqueue a snapshot write.
    ///
    /// The write is enqueued before the lock is released so that snapshot
    /// commands reach the writer in commit order.
    fn mutate<R>(&self, change: Change, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.lock();
        let result = f(&mut inner);
        inner.version += 1;
        if change == Change::Data {
            if let Some(snapshot) = inner.snapshot() {
                self.writer.save(snapshot);
            }
        }
        self.changes.send_replace(inner.version);
        result
    }

    fn reset(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.state.reset();
        inner.version += 1;
        self.writer.clear();
        self.changes.send_replace(inner.version);
    }
}

/// Identity of the session an operation started under.
#[derive(Debug, Clone)]
struct Ticket {
    epoch: u64,
    session_id: String,
}

enum Rejection {
    NoSession,
    UnknownTerm,
    Busy(TermActivity),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NoSession => write!(f, "no active session"),
            Rejection::UnknownTerm => write!(f, "unknown term"),
            Rejection::Busy(activity) => write!(f, "term busy ({})", activity),
        }
    }
}

enum LoadOutcome {
    Loaded,
    Failed(String),
    Stale,
}

/// Runs a closure when dropped, including when the owning future is
/// cancelled.
struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Owner of the current session state.
pub struct SessionStore {
    api: Arc<dyn ComplianceApi>,
    store: Arc<dyn KeyValueStore>,
    interactions: Arc<InteractionLog>,
    history: Arc<LocalHistory>,
    shared: Arc<Shared>,
}

impl SessionStore {
    /// Create an empty store. Must be called within a Tokio runtime.
    pub fn new(
        api: Arc<dyn ComplianceApi>,
        store: Arc<dyn KeyValueStore>,
        interactions: Arc<InteractionLog>,
        history: Arc<LocalHistory>,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: SessionState::default(),
                epoch: 0,
                load_seq: 0,
                version: 0,
            }),
            writer: SnapshotWriter::spawn(store.clone()),
            changes,
        });

        Self {
            api,
            store,
            interactions,
            history,
            shared,
        }
    }

    /// Rehydrate the role and the last persisted session.
    ///
    /// Returns whether a session was restored. Does not contact the server.
    pub async fn restore(&self) -> bool {
        let role = match self.store.get(keys::USER_ROLE).await {
            Ok(Some(raw)) => raw
                .parse::<UserRole>()
                .map_err(|e| warn!(error = %e, "Ignoring stored role"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored role");
                None
            }
        };
        let snapshot = read_snapshot(self.store.as_ref()).await;

        let restored = self.shared.mutate(Change::Flags, |inner| {
            if let Some(role) = role {
                inner.state.role = role;
            }
            match snapshot {
                Some(snapshot) if inner.state.session_id.is_none() => {
                    inner.state.session_id = Some(snapshot.session_id);
                    inner.state.terms = Some(snapshot.terms);
                    inner.state.meta = snapshot.meta;
                    true
                }
                _ => false,
            }
        });

        if restored {
            info!(session_id = ?self.session_id(), "Restored persisted session");
        }
        restored
    }

    // ------------------------------------------------------------------
    // Selectors
    // ------------------------------------------------------------------

    /// Copy of the full state
    pub fn snapshot(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.lock().state.session_id.clone()
    }

    pub fn terms(&self) -> Option<Vec<Term>> {
        self.shared.lock().state.terms.clone()
    }

    pub fn term(&self, term_id: &str) -> Option<Term> {
        self.shared.lock().state.term(term_id).cloned()
    }

    /// Metadata of the current session
    pub fn session_record(&self) -> Option<SessionRecord> {
        self.shared.lock().state.meta.clone()
    }

    /// Statistics derived from the current terms, `None` without terms
    pub fn compliance_stats(&self) -> Option<ComplianceStats> {
        self.shared.lock().state.compliance_stats()
    }

    pub fn role(&self) -> UserRole {
        self.shared.lock().state.role
    }

    /// Operation in flight on a term, if any
    pub fn term_activity(&self, term_id: &str) -> Option<TermActivity> {
        self.shared.lock().state.term_activity.get(term_id).copied()
    }

    pub fn is_term_busy(&self, term_id: &str) -> bool {
        self.shared.lock().state.is_term_busy(term_id)
    }

    /// Receiver notified after every state change.
    ///
    /// The value is a change counter; read the state with [`Self::snapshot`].
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    /// Wait until every snapshot write scheduled so far has completed.
    pub async fn flush(&self) {
        self.shared.writer.flush().await;
    }

    pub fn history(&self) -> &Arc<LocalHistory> {
        &self.history
    }

    pub fn interactions(&self) -> &Arc<InteractionLog> {
        &self.interactions
    }

    pub fn clear_error(&self) {
        self.shared
            .mutate(Change::Flags, |inner| inner.state.error = None);
    }

    pub fn clear_upload_error(&self) {
        self.shared
            .mutate(Change::Flags, |inner| inner.state.upload_error = None);
    }

    pub fn clear_analysis_error(&self) {
        self.shared
            .mutate(Change::Flags, |inner| inner.state.analysis_error = None);
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Upload a document, wait for its analysis and load the new session.
    ///
    /// Any previous session is cleared first. Returns the new session id.
    pub async fn upload_and_analyze(&self, file: CandidateFile) -> Option<String> {
        self.clear_session();

        let filename = file.name.clone();
        let epoch = self.shared.mutate(Change::Flags, |inner| {
            inner.state.is_uploading = true;
            inner.state.is_analyzing = true;
            inner.state.upload_progress = 0;
            inner.epoch
        });
        let _done = self.on_drop(move |inner| {
            if inner.epoch == epoch {
                inner.state.is_uploading = false;
                inner.state.is_analyzing = false;
                inner.state.upload_progress = 0;
            }
        });

        let shared = self.shared.clone();
        let progress: ProgressSink = Arc::new(move |stage: UploadStage| {
            shared.mutate(Change::Flags, |inner| {
                if inner.epoch == epoch && inner.state.is_uploading {
                    inner.state.upload_progress = stage.percent();
                }
            });
        });

        info!(filename = %filename, "Uploading contract for analysis");
        let response = match self.api.upload_contract(file, Some(progress)).await {
            Ok(response) => response,
            Err(e) => {
                error!(filename = %filename, error = %e, "Contract upload failed");
                let message = e.to_string();
                let transport = e.is_transport();
                self.shared.mutate(Change::Flags, |inner| {
                    if inner.epoch == epoch {
                        inner.state.error = Some(message.clone());
                        inner.state.analysis_error = Some(message.clone());
                        if transport {
                            inner.state.upload_error = Some(message);
                        }
                    }
                });
                return None;
            }
        };

        if self.shared.lock().epoch != epoch {
            debug!(session_id = %response.session_id, "Upload finished after the session was cleared");
            return None;
        }

        match self.load(&response.session_id).await {
            LoadOutcome::Loaded => {}
            LoadOutcome::Failed(message) => {
                self.shared.mutate(Change::Flags, |inner| {
                    inner.state.analysis_error = Some(message);
                });
                return None;
            }
            LoadOutcome::Stale => return None,
        }

        self.interactions
            .record(
                &response.session_id,
                InteractionType::QuestionAsked,
                None,
                Some(json!({"action": "contract_uploaded", "filename": filename})),
            )
            .await;

        info!(
            session_id = %response.session_id,
            terms = response.analysis_results.len(),
            language = %response.detected_contract_language,
            "Contract analyzed"
        );
        Some(response.session_id)
    }

    /// Fetch a session's metadata and terms and make it current.
    ///
    /// Loading a different session than the current one clears it first.
    /// On failure the error is surfaced and the session is cleared.
    pub async fn load_session_data(&self, session_id: &str) -> bool {
        matches!(self.load(session_id).await, LoadOutcome::Loaded)
    }

    /// Re-fetch the current session from the server.
    pub async fn refresh(&self) -> bool {
        match self.session_id() {
            Some(session_id) => self.load_session_data(&session_id).await,
            None => false,
        }
    }

    async fn load(&self, session_id: &str) -> LoadOutcome {
        let switching = self
            .shared
            .lock()
            .state
            .session_id
            .as_deref()
            .is_some_and(|current| current != session_id);
        if switching {
            self.clear_session();
        }

        let (epoch, seq) = self.shared.mutate(Change::Flags, |inner| {
            inner.load_seq += 1;
            inner.state.is_fetching_session = true;
            inner.state.error = None;
            (inner.epoch, inner.load_seq)
        });
        let _done = self.on_drop(move |inner| {
            if inner.epoch == epoch && inner.load_seq == seq {
                inner.state.is_fetching_session = false;
            }
        });

        debug!(session_id = %session_id, "Loading session");
        let fetched = tokio::try_join!(
            self.api.session_details(session_id),
            self.api.session_terms(session_id)
        );

        let (details, api_terms) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                if !self.is_load_current(epoch, seq) {
                    debug!(session_id = %session_id, error = %e, "Discarding failure of superseded load");
                    return LoadOutcome::Stale;
                }
                error!(session_id = %session_id, error = %e, "Failed to load session");
                let message = e.to_string();
                self.clear_session();
                self.shared.mutate(Change::Flags, |inner| {
                    inner.state.error = Some(message.clone());
                });
                return LoadOutcome::Failed(message);
            }
        };

        let activity = SessionActivity::new(self.interactions.query_by_session(session_id).await);
        let terms: Vec<Term> = api_terms
            .into_iter()
            .map(|t| Term::from_api(t).with_activity(&activity))
            .collect();
        let term_count = terms.len();
        let record = SessionRecord::new(details.clone(), &activity);

        let applied = self.shared.mutate(Change::Data, |inner| {
            if inner.epoch != epoch || inner.load_seq != seq {
                return false;
            }
            inner.state.session_id = Some(session_id.to_string());
            inner.state.terms = Some(terms);
            inner.state.meta = Some(record);
            inner.state.is_fetching_session = false;
            true
        });
        if !applied {
            debug!(session_id = %session_id, "Discarding superseded load result");
            return LoadOutcome::Stale;
        }

        if let Err(e) = self.history.upsert(&details).await {
            warn!(session_id = %session_id, error = %e, "Failed to save session to history");
        }

        info!(session_id = %session_id, terms = term_count, "Session loaded");
        LoadOutcome::Loaded
    }

    fn is_load_current(&self, epoch: u64, seq: u64) -> bool {
        let inner = self.shared.lock();
        inner.epoch == epoch && inner.load_seq == seq
    }

    /// Make a history entry the current session without contacting the
    /// server.
    pub async fn load_from_history(&self, record: SessionRecord) {
        self.clear_session();
        let epoch = self.shared.lock().epoch;

        let session_id = record.session_id().to_string();
        let activity = SessionActivity::new(self.interactions.query_by_session(&session_id).await);
        let terms: Vec<Term> = record
            .details
            .analysis_results
            .iter()
            .cloned()
            .map(|t| Term::from_api(t).with_activity(&activity))
            .collect();

        self.shared.mutate(Change::Data, |inner| {
            if inner.epoch != epoch {
                return;
            }
            inner.state.session_id = Some(session_id.clone());
            inner.state.terms = Some(terms);
            inner.state.meta = Some(record);
        });
        info!(session_id = %session_id, "Session opened from history");
    }

    /// Reset to the initial state (keeping the role) and erase the
    /// persisted snapshot. Idempotent.
    ///
    /// Operations still in flight complete into the void.
    pub fn clear_session(&self) {
        self.shared.reset();
        debug!("Session cleared");
    }

    // ------------------------------------------------------------------
    // Term operations
    // ------------------------------------------------------------------

    /// Ask a question about one term. Returns the answer.
    pub async fn ask_question_about_term(&self, term_id: &str, question: &str) -> Option<String> {
        if question.trim().is_empty() {
            self.reject_input(ValidationError::new("question", "must not be empty"));
            return None;
        }
        let (ticket, term) = self.begin_term_op(term_id, TermActivity::Asking)?;
        let _release = self.release_on_drop(&ticket, term_id);

        let request = QuestionRequest::general(&ticket.session_id, question)
            .about_term(term_id, &term.analysis.term_text);

        match self.api.ask_question(request).await {
            Ok(answer) => {
                if !self.apply_to_term(&ticket, term_id, |t| t.apply_answer(&answer)) {
                    return None;
                }
                self.interactions
                    .record(
                        &ticket.session_id,
                        InteractionType::QuestionAsked,
                        Some(term_id),
                        Some(json!({"question": question, "answer": answer})),
                    )
                    .await;
                Some(answer)
            }
            Err(e) => {
                error!(term_id = %term_id, error = %e, "Term question failed");
                self.fail(ticket.epoch, e.to_string());
                None
            }
        }
    }

    /// Ask a question about the whole contract. Returns the answer.
    pub async fn ask_general_contract_question(&self, question: &str) -> Option<String> {
        if question.trim().is_empty() {
            self.reject_input(ValidationError::new("question", "must not be empty"));
            return None;
        }

        let ticket = self.shared.mutate(Change::Flags, |inner| -> Option<Ticket> {
            let session_id = inner.state.session_id.clone()?;
            if inner.state.is_processing_general_question {
                return None;
            }
            inner.state.is_processing_general_question = true;
            Some(Ticket {
                epoch: inner.epoch,
                session_id,
            })
        });
        let Some(ticket) = ticket else {
            debug!("General question skipped: no session or one already in flight");
            return None;
        };
        let epoch = ticket.epoch;
        let _release = self.on_drop(move |inner| {
            if inner.epoch == epoch {
                inner.state.is_processing_general_question = false;
            }
        });

        let request = QuestionRequest::general(&ticket.session_id, question);
        match self.api.ask_question(request).await {
            Ok(answer) => {
                let current = self.shared.lock().is_current(&ticket);
                if !current {
                    return None;
                }
                self.interactions
                    .record(
                        &ticket.session_id,
                        InteractionType::QuestionAsked,
                        None,
                        Some(json!({"question": question, "answer": answer, "scope": "general"})),
                    )
                    .await;
                Some(answer)
            }
            Err(e) => {
                error!(error = %e, "General question failed");
                self.fail(ticket.epoch, e.to_string());
                None
            }
        }
    }

    /// Submit proposed wording for review.
    ///
    /// The reviewed text replaces the user's edit and any earlier
    /// confirmation is withdrawn.
    pub async fn review_user_modification(
        &self,
        term_id: &str,
        proposed_text: &str,
        original_text: &str,
    ) -> bool {
        if proposed_text.trim().is_empty() {
            self.reject_input(ValidationError::new("user_modified_text", "must not be empty"));
            return false;
        }
        let Some((ticket, _)) = self.begin_term_op(term_id, TermActivity::Reviewing) else {
            return false;
        };
        let _release = self.release_on_drop(&ticket, term_id);

        let request = ReviewRequest {
            session_id: ticket.session_id.clone(),
            term_id: term_id.to_string(),
            user_modified_text: proposed_text.to_string(),
            original_term_text: original_text.to_string(),
        };

        match self.api.review_modification(request).await {
            Ok(review) => {
                if !self.apply_to_term(&ticket, term_id, |t| t.apply_review(&review)) {
                    return false;
                }
                self.interactions
                    .record(
                        &ticket.session_id,
                        InteractionType::TermModified,
                        Some(term_id),
                        Some(json!({
                            "action": "reviewed",
                            "original_text": original_text,
                            "reviewed_text": review.reviewed_text,
                            "is_valid": review.is_still_compliant,
                        })),
                    )
                    .await;
                true
            }
            Err(e) => {
                error!(term_id = %term_id, error = %e, "Modification review failed");
                self.fail(ticket.epoch, e.to_string());
                false
            }
        }
    }

    /// Confirm the final wording of a term.
    pub async fn confirm_term_modification(&self, term_id: &str, final_text: &str) -> bool {
        if final_text.trim().is_empty() {
            self.reject_input(ValidationError::new("modified_text", "must not be empty"));
            return false;
        }
        let Some((ticket, _)) = self.begin_term_op(term_id, TermActivity::Confirming) else {
            return false;
        };
        let _release = self.release_on_drop(&ticket, term_id);

        let request = ConfirmRequest {
            session_id: ticket.session_id.clone(),
            term_id: term_id.to_string(),
            modified_text: final_text.to_string(),
        };

        match self.api.confirm_modification(request).await {
            Ok(response) if response.success => {
                if !self.apply_to_term(&ticket, term_id, |t| t.apply_confirmation(final_text)) {
                    return false;
                }
                self.interactions
                    .record(
                        &ticket.session_id,
                        InteractionType::TermModified,
                        Some(term_id),
                        Some(json!({"action": "confirmed", "confirmed_text": final_text})),
                    )
                    .await;
                true
            }
            Ok(response) => {
                warn!(term_id = %term_id, message = %response.message, "Confirmation rejected");
                self.fail(ticket.epoch, rejection_message(response.message, "Confirmation was rejected"));
                false
            }
            Err(e) => {
                error!(term_id = %term_id, error = %e, "Confirmation failed");
                self.fail(ticket.epoch, e.to_string());
                false
            }
        }
    }

    /// Submit an expert's assessment of a term.
    ///
    /// The expert verdict in the payload becomes the term's override, even
    /// when it is absent.
    pub async fn submit_expert_feedback(&self, payload: ExpertFeedbackPayload) -> bool {
        let term_id = payload.term_id.clone();
        let Some((ticket, _)) = self.begin_term_op(&term_id, TermActivity::SubmittingFeedback)
        else {
            return false;
        };
        let _release = self.release_on_drop(&ticket, &term_id);

        if ticket.session_id != payload.session_id {
            warn!(
                term_id = %term_id,
                payload_session = %payload.session_id,
                "Feedback targets a session that is not current"
            );
            return false;
        }

        match self.api.submit_expert_feedback(payload.clone()).await {
            Ok(response) if response.success => {
                let feedback_id = response.feedback_id.clone();
                if !self.apply_to_term(&ticket, &term_id, |t| {
                    t.apply_expert_feedback(&payload, feedback_id)
                }) {
                    return false;
                }
                self.interactions
                    .record(
                        &ticket.session_id,
                        InteractionType::ExpertFeedback,
                        Some(&term_id),
                        serde_json::to_value(&payload.feedback_data).ok(),
                    )
                    .await;
                info!(term_id = %term_id, feedback_id = ?response.feedback_id, "Expert feedback recorded");
                true
            }
            Ok(response) => {
                warn!(term_id = %term_id, message = %response.message, "Expert feedback rejected");
                self.fail(ticket.epoch, rejection_message(response.message, "Expert feedback was rejected"));
                false
            }
            Err(e) => {
                error!(term_id = %term_id, error = %e, "Expert feedback submission failed");
                self.fail(ticket.epoch, e.to_string());
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Generated documents
    // ------------------------------------------------------------------

    /// Generate the contract with confirmed wording applied.
    pub async fn generate_modified_contract(&self) -> Option<GenerateResponse> {
        self.generate(ContractKind::Modified).await
    }

    /// Generate the contract with non-compliant terms highlighted.
    pub async fn generate_marked_contract(&self) -> Option<GenerateResponse> {
        self.generate(ContractKind::Marked).await
    }

    async fn generate(&self, kind: ContractKind) -> Option<GenerateResponse> {
        let ticket = self.shared.mutate(Change::Flags, |inner| -> Option<Ticket> {
            let session_id = inner.state.session_id.clone()?;
            let flag = inner.state.generating_mut(kind);
            if *flag {
                return None;
            }
            *flag = true;
            Some(Ticket {
                epoch: inner.epoch,
                session_id,
            })
        });
        let Some(ticket) = ticket else {
            debug!(kind = %kind, "Generation skipped: no session or one already in flight");
            return None;
        };
        let epoch = ticket.epoch;
        let _release = self.on_drop(move |inner| {
            if inner.epoch == epoch {
                *inner.state.generating_mut(kind) = false;
            }
        });

        info!(session_id = %ticket.session_id, kind = %kind, "Generating contract");
        let result = match kind {
            ContractKind::Modified => self.api.generate_modified_contract(&ticket.session_id).await,
            ContractKind::Marked => self.api.generate_marked_contract(&ticket.session_id).await,
        };

        let response = match result {
            Ok(response) if response.success => response,
            Ok(response) => {
                warn!(kind = %kind, message = %response.message, "Generation rejected");
                self.fail(epoch, rejection_message(response.message, "Contract generation failed"));
                return None;
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "Contract generation failed");
                self.fail(epoch, e.to_string());
                return None;
            }
        };

        let applied = self.shared.mutate(Change::Data, |inner| {
            if !inner.is_current(&ticket) {
                return false;
            }
            let record = inner.state.meta.get_or_insert_with(|| SessionRecord {
                details: SessionDetails::new(ticket.session_id.as_str()),
                ..Default::default()
            });
            let slot = match kind {
                ContractKind::Modified => &mut record.details.modified_contract_info,
                ContractKind::Marked => &mut record.details.marked_contract_info,
            };
            merge_generated(slot.get_or_insert_with(Default::default), &response);
            true
        });
        if !applied {
            return None;
        }

        self.interactions
            .record(
                &ticket.session_id,
                InteractionType::ContractGenerated,
                None,
                Some(json!({"type": kind, "success": true})),
            )
            .await;
        Some(response)
    }

    /// Attach a preview document to the current session's metadata.
    ///
    /// Returns `false` when there is no session metadata to update.
    pub fn update_preview_info(&self, kind: ContractKind, info: FileInfo) -> bool {
        self.shared.mutate(Change::Data, |inner| {
            let Some(record) = inner.state.meta.as_mut() else {
                return false;
            };
            let preview = record
                .details
                .pdf_preview_info
                .get_or_insert_with(Default::default);
            match kind {
                ContractKind::Modified => preview.modified = Some(info),
                ContractKind::Marked => preview.marked = Some(info),
            }
            true
        })
    }

    // ------------------------------------------------------------------
    // Role and account
    // ------------------------------------------------------------------

    pub async fn set_user_role(&self, role: UserRole) {
        self.shared
            .mutate(Change::Flags, |inner| inner.state.role = role);
        self.persist_role(role).await;
    }

    /// Switch between regular user and expert. Returns the new role.
    pub async fn toggle_user_role(&self) -> UserRole {
        let role = self.shared.mutate(Change::Flags, |inner| {
            inner.state.role = inner.state.role.toggled();
            inner.state.role
        });
        self.persist_role(role).await;
        role
    }

    async fn persist_role(&self, role: UserRole) {
        if let Err(e) = self.store.set(keys::USER_ROLE, role.as_str()).await {
            warn!(role = %role, error = %e, "Failed to persist role");
        }
    }

    /// Sessions recorded server-side for this account. Empty when the
    /// service is unreachable.
    pub async fn remote_history(&self) -> Vec<SessionDetails> {
        self.api.session_history().await
    }

    /// Account statistics. Defaults when the service is unreachable.
    pub async fn user_stats(&self) -> UserStats {
        self.api.user_stats().await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn begin_term_op(&self, term_id: &str, activity: TermActivity) -> Option<(Ticket, Term)> {
        let started = self.shared.mutate(Change::Flags, |inner| -> Result<_, Rejection> {
            let session_id = inner.state.session_id.clone().ok_or(Rejection::NoSession)?;
            let term = inner
                .state
                .term(term_id)
                .cloned()
                .ok_or(Rejection::UnknownTerm)?;
            if let Some(current) = inner.state.term_activity.get(term_id) {
                return Err(Rejection::Busy(*current));
            }
            inner
                .state
                .term_activity
                .insert(term_id.to_string(), activity);
            Ok((
                Ticket {
                    epoch: inner.epoch,
                    session_id,
                },
                term,
            ))
        });

        match started {
            Ok(started) => Some(started),
            Err(rejection) => {
                debug!(term_id = %term_id, activity = %activity, reason = %rejection, "Term operation skipped");
                None
            }
        }
    }

    fn release_on_drop(&self, ticket: &Ticket, term_id: &str) -> OnDrop<impl FnOnce()> {
        let epoch = ticket.epoch;
        let term_id = term_id.to_string();
        self.on_drop(move |inner| {
            if inner.epoch == epoch {
                inner.state.term_activity.remove(&term_id);
            }
        })
    }

    fn on_drop(&self, f: impl FnOnce(&mut Inner) + Send + 'static) -> OnDrop<impl FnOnce()> {
        let shared = self.shared.clone();
        OnDrop(Some(move || shared.mutate(Change::Flags, f)))
    }

    /// Apply `f` to a term of the ticket's session and count the interaction.
    /// Returns `false` when the session is no longer current.
    fn apply_to_term(&self, ticket: &Ticket, term_id: &str, f: impl FnOnce(&mut Term)) -> bool {
        let applied = self.shared.mutate(Change::Data, |inner| {
            if !inner.is_current(ticket) {
                return false;
            }
            let term = inner
                .state
                .terms
                .as_mut()
                .and_then(|terms| terms.iter_mut().find(|t| t.id() == term_id));
            match term {
                Some(term) => {
                    f(term);
                    term.touch();
                    true
                }
                None => false,
            }
        });
        if !applied {
            debug!(term_id = %term_id, session_id = %ticket.session_id, "Discarding result for a session that is no longer current");
        }
        applied
    }

    fn fail(&self, epoch: u64, message: String) {
        self.shared.mutate(Change::Flags, |inner| {
            if inner.epoch == epoch {
                inner.state.error = Some(message);
            }
        });
    }

    fn reject_input(&self, err: ValidationError) {
        warn!(field = %err.field, reason = %err.reason, "Rejected input");
        self.shared
            .mutate(Change::Flags, |inner| inner.state.error = Some(err.to_string()));
    }
}

fn rejection_message(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

fn merge_generated(slot: &mut GeneratedContractInfo, response: &GenerateResponse) {
    if let Some(url) = &response.docx_url {
        slot.docx_cloudinary_info = Some(FileInfo::docx(url.as_str()));
    }
    if let Some(url) = &response.txt_url {
        slot.txt_cloudinary_info = Some(FileInfo {
            url: url.clone(),
            format: "txt".to_string(),
            ..Default::default()
        });
    }
}
