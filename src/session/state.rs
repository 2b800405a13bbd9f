use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::stats::ComplianceStats;
use super::term::Term;
use crate::gateway::ContractKind;
use crate::history::SessionRecord;

/// Who is reviewing the contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    RegularUser,
    ShariahExpert,
}

impl UserRole {
    /// The other role
    pub fn toggled(self) -> Self {
        match self {
            UserRole::RegularUser => UserRole::ShariahExpert,
            UserRole::ShariahExpert => UserRole::RegularUser,
        }
    }

    /// Stored form of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::RegularUser => "regular_user",
            UserRole::ShariahExpert => "shariah_expert",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regular_user" | "regular" | "user" => Ok(UserRole::RegularUser),
            "shariah_expert" | "expert" => Ok(UserRole::ShariahExpert),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// In-flight operation on a single term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermActivity {
    Asking,
    Reviewing,
    Confirming,
    SubmittingFeedback,
}

impl std::fmt::Display for TermActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TermActivity::Asking => write!(f, "asking"),
            TermActivity::Reviewing => write!(f, "reviewing"),
            TermActivity::Confirming => write!(f, "confirming"),
            TermActivity::SubmittingFeedback => write!(f, "submitting_feedback"),
        }
    }
}

/// Observable state of the current session.
///
/// `session_id` and `terms` are either both set or both unset outside of
/// transient loading windows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub session_id: Option<String>,
    pub terms: Option<Vec<Term>>,
    pub meta: Option<SessionRecord>,
    pub role: UserRole,

    /// Terms with an operation in flight. At most one per term.
    pub term_activity: HashMap<String, TermActivity>,
    pub is_uploading: bool,
    pub is_analyzing: bool,
    /// Upload progress in percent.
    pub upload_progress: u8,
    pub is_fetching_session: bool,
    pub is_processing_general_question: bool,
    pub is_generating_modified: bool,
    pub is_generating_marked: bool,

    pub error: Option<String>,
    pub upload_error: Option<String>,
    pub analysis_error: Option<String>,
}

impl SessionState {
    /// Statistics over the current terms, `None` without terms
    pub fn compliance_stats(&self) -> Option<ComplianceStats> {
        self.terms.as_deref().map(ComplianceStats::from_terms)
    }

    /// Term by id
    pub fn term(&self, term_id: &str) -> Option<&Term> {
        self.terms.as_ref()?.iter().find(|t| t.id() == term_id)
    }

    pub fn is_term_busy(&self, term_id: &str) -> bool {
        self.term_activity.contains_key(term_id)
    }

    pub fn is_generating(&self, kind: ContractKind) -> bool {
        match kind {
            ContractKind::Modified => self.is_generating_modified,
            ContractKind::Marked => self.is_generating_marked,
        }
    }

    pub(crate) fn generating_mut(&mut self, kind: ContractKind) -> &mut bool {
        match kind {
            ContractKind::Modified => &mut self.is_generating_modified,
            ContractKind::Marked => &mut self.is_generating_marked,
        }
    }

    /// Whether any network operation is in flight
    pub fn is_busy(&self) -> bool {
        !self.term_activity.is_empty()
            || self.is_uploading
            || self.is_analyzing
            || self.is_fetching_session
            || self.is_processing_general_question
            || self.is_generating_modified
            || self.is_generating_marked
    }

    /// Initial state, keeping only the role.
    pub(crate) fn reset(&mut self) {
        *self = SessionState {
            role: self.role,
            ..Default::default()
        };
    }
}
