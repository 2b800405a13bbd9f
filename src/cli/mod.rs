//! Command-line front end for the session store.
//!
//! Each invocation runs one command against the restored session and prints
//! a plain-text report. State carries over between invocations through the
//! persisted snapshot.

use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::app::AppState;
use crate::gateway::{CandidateFile, ContractKind, ExpertFeedbackData, ExpertFeedbackPayload};
use crate::session::{SessionState, Term, UserRole};

/// Session CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Upload a contract and analyze it
    Analyze {
        /// Path to the contract document
        path: PathBuf,

        /// MIME type; guessed from the extension when omitted
        #[arg(long)]
        mime: Option<String>,

        /// Page images of a scanned contract, in order
        #[arg(long = "page")]
        pages: Vec<String>,
    },

    /// Show the current session, its terms and statistics
    Status,

    /// Fetch a session from the server and make it current
    Load {
        /// Session id; reloads the current session when omitted
        session_id: Option<String>,
    },

    /// Ask about one term or, without --term, the whole contract
    Ask {
        question: String,

        #[arg(long)]
        term: Option<String>,
    },

    /// Submit new wording for a term for review
    Review { term_id: String, text: String },

    /// Confirm the final wording of a term
    Confirm {
        term_id: String,

        /// Final text; defaults to the latest reviewed or suggested wording
        text: Option<String>,
    },

    /// Generate the modified or marked contract
    Generate {
        /// modified or marked
        kind: ContractKind,
    },

    /// Submit expert feedback on a term
    Feedback {
        term_id: String,

        /// Expert verdict on compliance
        #[arg(long)]
        compliant: Option<bool>,

        /// Whether the automated analysis was correct
        #[arg(long)]
        approve: Option<bool>,

        #[arg(long, default_value = "")]
        comment: String,

        #[arg(long)]
        issue: Option<String>,

        #[arg(long)]
        suggestion: Option<String>,
    },

    /// Inspect and manage saved sessions
    History {
        #[command(subcommand)]
        action: Option<HistoryCommands>,
    },

    /// Show account statistics from the server
    Stats,

    /// Show, set or toggle the user role
    Role {
        /// regular_user or shariah_expert; toggles when omitted
        role: Option<UserRole>,
    },

    /// Forget the current session
    Clear,
}

/// History subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommands {
    /// List locally saved sessions
    List,
    /// Open a saved session without contacting the server
    Open { session_id: String },
    /// Delete a saved session and its interaction log
    Remove { session_id: String },
    /// Toggle the bookmark on a saved session
    Bookmark { session_id: String },
    /// List sessions recorded on the server
    Remote,
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a CLI command.
pub async fn execute_command(command: Commands, state: &AppState) -> CliResult {
    match command {
        Commands::Analyze { path, mime, pages } => execute_analyze(state, &path, mime, pages).await,
        Commands::Status => execute_status(state),
        Commands::Load { session_id } => execute_load(state, session_id).await,
        Commands::Ask { question, term } => execute_ask(state, &question, term.as_deref()).await,
        Commands::Review { term_id, text } => execute_review(state, &term_id, &text).await,
        Commands::Confirm { term_id, text } => execute_confirm(state, &term_id, text).await,
        Commands::Generate { kind } => execute_generate(state, kind).await,
        Commands::Feedback {
            term_id,
            compliant,
            approve,
            comment,
            issue,
            suggestion,
        } => {
            let feedback_data = ExpertFeedbackData {
                ai_analysis_approved: approve,
                expert_is_compliant: compliant,
                expert_comment: comment,
                expert_corrected_issue: issue,
                expert_corrected_suggestion: suggestion,
            };
            execute_feedback(state, term_id, feedback_data).await
        }
        Commands::History { action } => {
            execute_history(state, action.unwrap_or(HistoryCommands::List)).await
        }
        Commands::Stats => execute_stats(state).await,
        Commands::Role { role } => execute_role(state, role).await,
        Commands::Clear => {
            state.session.clear_session();
            CliResult::success("Session cleared.")
        }
    }
}

async fn execute_analyze(
    state: &AppState,
    path: &Path,
    mime: Option<String>,
    pages: Vec<String>,
) -> CliResult {
    let mime = mime.unwrap_or_else(|| guess_mime(path).to_string());
    let mut file = CandidateFile::from_path(path, mime);
    if let Ok(meta) = tokio::fs::metadata(path).await {
        file.size = Some(meta.len());
    }
    if !pages.is_empty() {
        file = file.with_pages(pages);
    }

    match state.session.upload_and_analyze(file).await {
        Some(session_id) => CliResult::success(format!(
            "Analyzed as session {}\n{}",
            session_id,
            render_status(&state.session.snapshot())
        )),
        None => CliResult::error(failure_message(&state.session.snapshot(), "Analysis failed")),
    }
}

fn execute_status(state: &AppState) -> CliResult {
    CliResult::success(render_status(&state.session.snapshot()))
}

async fn execute_load(state: &AppState, session_id: Option<String>) -> CliResult {
    let loaded = match session_id {
        Some(id) => state.session.load_session_data(&id).await,
        None => state.session.refresh().await,
    };
    if loaded {
        CliResult::success(render_status(&state.session.snapshot()))
    } else {
        CliResult::error(failure_message(&state.session.snapshot(), "No session to load"))
    }
}

async fn execute_ask(state: &AppState, question: &str, term_id: Option<&str>) -> CliResult {
    let answer = match term_id {
        Some(term_id) => state.session.ask_question_about_term(term_id, question).await,
        None => state.session.ask_general_contract_question(question).await,
    };
    match answer {
        Some(answer) => CliResult::success(answer),
        None => CliResult::error(failure_message(&state.session.snapshot(), "Question not sent")),
    }
}

async fn execute_review(state: &AppState, term_id: &str, text: &str) -> CliResult {
    let Some(term) = state.session.term(term_id) else {
        return CliResult::error(format!("Unknown term: {}", term_id));
    };

    if !state
        .session
        .review_user_modification(term_id, text, &term.analysis.term_text)
        .await
    {
        return CliResult::error(failure_message(&state.session.snapshot(), "Review not sent"));
    }

    match state.session.term(term_id) {
        Some(term) => CliResult::success(render_term(&term)),
        None => CliResult::error("Session changed during review"),
    }
}

async fn execute_confirm(state: &AppState, term_id: &str, text: Option<String>) -> CliResult {
    let Some(term) = state.session.term(term_id) else {
        return CliResult::error(format!("Unknown term: {}", term_id));
    };
    let text = text.unwrap_or_else(|| term.proposed_text().to_string());

    if state.session.confirm_term_modification(term_id, &text).await {
        let percentage = state
            .session
            .compliance_stats()
            .map(|s| s.rounded_percentage())
            .unwrap_or_default();
        CliResult::success(format!(
            "Confirmed {}: {}\nCompliance now {:.2}%",
            term_id, text, percentage
        ))
    } else {
        CliResult::error(failure_message(&state.session.snapshot(), "Confirmation not sent"))
    }
}

async fn execute_generate(state: &AppState, kind: ContractKind) -> CliResult {
    let response = match kind {
        ContractKind::Modified => state.session.generate_modified_contract().await,
        ContractKind::Marked => state.session.generate_marked_contract().await,
    };
    match response {
        Some(response) => {
            let mut output = format!("Generated {} contract\n", kind);
            if let Some(url) = response.docx_url {
                output.push_str(&format!("  docx: {}\n", url));
            }
            if let Some(url) = response.txt_url {
                output.push_str(&format!("  txt:  {}\n", url));
            }
            CliResult::success(output)
        }
        None => CliResult::error(failure_message(&state.session.snapshot(), "Generation not started")),
    }
}

async fn execute_feedback(
    state: &AppState,
    term_id: String,
    feedback_data: ExpertFeedbackData,
) -> CliResult {
    if state.session.role() != UserRole::ShariahExpert {
        return CliResult::error("Expert feedback requires the shariah_expert role");
    }
    let Some(session_id) = state.session.session_id() else {
        return CliResult::error("No active session");
    };

    let payload = ExpertFeedbackPayload {
        session_id,
        term_id: term_id.clone(),
        feedback_data,
    };
    if state.session.submit_expert_feedback(payload).await {
        match state.session.term(&term_id) {
            Some(term) => CliResult::success(render_term(&term)),
            None => CliResult::success("Feedback submitted."),
        }
    } else {
        CliResult::error(failure_message(&state.session.snapshot(), "Feedback not sent"))
    }
}

async fn execute_history(state: &AppState, action: HistoryCommands) -> CliResult {
    match action {
        HistoryCommands::List => {
            let entries = state.history.list().await;
            if entries.is_empty() {
                return CliResult::success("No saved sessions.");
            }
            let mut output = format!("Saved sessions ({})\n", entries.len());
            for entry in &entries {
                output.push_str(&format!(
                    "  {} {:<24} {:<28} {} interactions\n",
                    if entry.is_bookmarked { "*" } else { " " },
                    entry.session_id(),
                    truncate(&entry.details.original_filename, 28),
                    entry.total_interactions
                ));
            }
            CliResult::success(output)
        }
        HistoryCommands::Open { session_id } => match state.history.get(&session_id).await {
            Some(record) => {
                state.session.load_from_history(record).await;
                CliResult::success(render_status(&state.session.snapshot()))
            }
            None => CliResult::error(format!("No saved session {}", session_id)),
        },
        HistoryCommands::Remove { session_id } => match state.history.remove(&session_id).await {
            Ok(()) => {
                if state.session.session_id().as_deref() == Some(session_id.as_str()) {
                    state.session.clear_session();
                }
                CliResult::success(format!("Removed {}", session_id))
            }
            Err(e) => CliResult::error(format!("Failed to remove {}: {}", session_id, e)),
        },
        HistoryCommands::Bookmark { session_id } => {
            match state.history.toggle_bookmark(&session_id).await {
                Ok(Some(true)) => CliResult::success(format!("Bookmarked {}", session_id)),
                Ok(Some(false)) => CliResult::success(format!("Unbookmarked {}", session_id)),
                Ok(None) => CliResult::error(format!("No saved session {}", session_id)),
                Err(e) => CliResult::error(format!("Failed to update {}: {}", session_id, e)),
            }
        }
        HistoryCommands::Remote => {
            let sessions = state.session.remote_history().await;
            let mut output = format!("Server sessions ({})\n", sessions.len());
            for details in &sessions {
                output.push_str(&format!(
                    "  {:<24} {:<28} {}\n",
                    details.session_id,
                    truncate(&details.original_filename, 28),
                    details.analysis_timestamp
                ));
            }
            CliResult::success(output)
        }
    }
}

async fn execute_stats(state: &AppState) -> CliResult {
    let stats = state.session.user_stats().await;
    CliResult::success(format!(
        "Sessions:        {}\nTerms analyzed:  {}\nCompliance rate: {:.1}%\nAvg processing:  {:.1}s",
        stats.total_sessions, stats.total_terms, stats.compliance_rate, stats.average_processing_time
    ))
}

async fn execute_role(state: &AppState, role: Option<UserRole>) -> CliResult {
    let role = match role {
        Some(role) => {
            state.session.set_user_role(role).await;
            role
        }
        None => state.session.toggle_user_role().await,
    };
    CliResult::success(format!("Role: {}", role))
}

// ============================================================================
// Rendering
// ============================================================================

fn render_status(state: &SessionState) -> String {
    let Some(session_id) = &state.session_id else {
        return format!("No active session (role: {})", state.role);
    };

    let mut output = String::new();
    output.push_str(&format!("Session {}", session_id));
    if let Some(meta) = &state.meta {
        if !meta.details.original_filename.is_empty() {
            output.push_str(&format!(" - {}", meta.details.original_filename));
        }
    }
    output.push_str(&format!(" (role: {})\n", state.role));

    if let Some(stats) = state.compliance_stats() {
        output.push_str(&format!(
            "Compliance: {:.2}% ({}/{} terms, {} confirmed, {} expert-reviewed)\n",
            stats.rounded_percentage(),
            stats.compliant_count,
            stats.total_terms,
            stats.user_modified_terms,
            stats.expert_reviewed_terms
        ));
    }

    output.push('\n');
    for term in state.terms.iter().flatten() {
        output.push_str(&render_term(term));
    }

    if let Some(error) = &state.error {
        output.push_str(&format!("\nLast error: {}\n", error));
    }
    output
}

fn render_term(term: &Term) -> String {
    let marker = if term.effective_compliance() { "OK " } else { "!! " };
    let mut output = format!(
        "{} [{}] {}\n",
        marker,
        term.id(),
        truncate(&term.analysis.term_text, 72)
    );
    if let Some(issue) = &term.analysis.compliance_issue {
        if !term.effective_compliance() {
            output.push_str(&format!("      issue: {}\n", issue));
        }
    }
    if let Some(text) = &term.user_modified_text {
        let status = if term.is_user_confirmed { "confirmed" } else { "proposed" };
        output.push_str(&format!("      {}: {}\n", status, truncate(text, 72)));
    }
    if let Some(verdict) = term.analysis.expert_override {
        output.push_str(&format!("      expert verdict: {}\n", if verdict { "compliant" } else { "non-compliant" }));
    }
    if let Some(answer) = &term.current_qa_answer {
        output.push_str(&format!("      answer: {}\n", truncate(answer, 72)));
    }
    output
}

fn failure_message(state: &SessionState, fallback: &str) -> String {
    state
        .error
        .clone()
        .or_else(|| state.analysis_error.clone())
        .unwrap_or_else(|| fallback.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "txt" => "text/plain",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ApiTerm;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("lease.PDF")), "application/pdf");
        assert_eq!(guess_mime(Path::new("scan.jpeg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("notes")), "application/octet-stream");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("عقد الإيجار الشهري", 8), "عقد ا...");
    }

    #[test]
    fn test_render_status_without_session() {
        let state = SessionState::default();
        assert_eq!(render_status(&state), "No active session (role: regular_user)");
    }

    #[test]
    fn test_render_status_lists_terms() {
        let state = SessionState {
            session_id: Some("S1".to_string()),
            terms: Some(vec![
                Term::from_api(ApiTerm::new("t1", "Rent is due monthly.", true)),
                Term::from_api(
                    ApiTerm::new("t2", "Late fees accrue interest.", false).with_issue("Interest"),
                ),
            ]),
            ..Default::default()
        };

        let output = render_status(&state);
        assert!(output.contains("Session S1"));
        assert!(output.contains("Compliance: 50.00%"));
        assert!(output.contains("OK  [t1]"));
        assert!(output.contains("!!  [t2]"));
        assert!(output.contains("issue: Interest"));
    }

    #[test]
    fn test_failure_message_prefers_error_slot() {
        let mut state = SessionState::default();
        assert_eq!(failure_message(&state, "fallback"), "fallback");
        state.analysis_error = Some("analysis".to_string());
        assert_eq!(failure_message(&state, "fallback"), "analysis");
        state.error = Some("general".to_string());
        assert_eq!(failure_message(&state, "fallback"), "general");
    }
}
