//! Remote analysis service gateway.
//!
//! Each session operation maps to exactly one HTTP call. The gateway injects
//! the bearer token and the fixed tunnel header, decodes bodies by content
//! type, and normalizes failures into [`GatewayError`]. It keeps no session
//! state between calls.
//!
//! [`GatewayError`]: crate::error::GatewayError

mod auth;
mod client;
mod types;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use auth::{StaticToken, StoredToken, TokenProvider};
pub use client::{ApiClient, TUNNEL_WARNING_HEADER};
pub use types::*;

use async_trait::async_trait;

use crate::error::GatewayResult;

/// Operations offered by the analysis service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComplianceApi: Send + Sync {
    /// Upload a document and run the first analysis.
    async fn upload_contract(
        &self,
        file: CandidateFile,
        progress: Option<ProgressSink>,
    ) -> GatewayResult<AnalyzeResponse>;

    /// Fetch session metadata.
    async fn session_details(&self, session_id: &str) -> GatewayResult<SessionDetails>;

    /// Fetch the analyzed terms of a session.
    async fn session_terms(&self, session_id: &str) -> GatewayResult<Vec<ApiTerm>>;

    /// Ask a question; returns the raw answer text.
    async fn ask_question(&self, request: QuestionRequest) -> GatewayResult<String>;

    /// Re-validate user-edited wording.
    async fn review_modification(&self, request: ReviewRequest) -> GatewayResult<ReviewResponse>;

    /// Confirm the final wording of a term.
    async fn confirm_modification(&self, request: ConfirmRequest)
        -> GatewayResult<ConfirmResponse>;

    /// Generate the contract with confirmed modifications applied.
    async fn generate_modified_contract(&self, session_id: &str)
        -> GatewayResult<GenerateResponse>;

    /// Generate the contract with non-compliant terms marked.
    async fn generate_marked_contract(&self, session_id: &str) -> GatewayResult<GenerateResponse>;

    /// Submit an expert assessment of a term.
    async fn submit_expert_feedback(
        &self,
        payload: ExpertFeedbackPayload,
    ) -> GatewayResult<ExpertFeedbackResponse>;

    /// Sessions known to the server. Empty when unavailable.
    async fn session_history(&self) -> Vec<SessionDetails>;

    /// Account statistics. Defaults when unavailable.
    async fn user_stats(&self) -> UserStats;
}
