use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::{ApiTerm, ExpertFeedbackPayload, ReviewResponse};
use crate::interactions::SessionActivity;

/// A term of the current session: the server's analysis plus client-side
/// review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    #[serde(flatten)]
    pub analysis: ApiTerm,
    /// The user confirmed `user_modified_text` as the final wording.
    #[serde(default)]
    pub is_user_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_modified_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_qa_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_reviewed_suggestion_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_suggestion_issue: Option<String>,
    #[serde(default)]
    pub expert_feedback_history: Vec<ExpertFeedbackPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interaction_count: usize,
}

impl Term {
    /// Client view of a server term.
    ///
    /// A confirmation already recorded by the server seeds the local
    /// confirmation state, so confirmed wording survives a reload.
    pub fn from_api(analysis: ApiTerm) -> Self {
        let is_user_confirmed = analysis.is_confirmed_by_user.unwrap_or(false);
        let user_modified_text = if is_user_confirmed {
            analysis.confirmed_modified_text.clone()
        } else {
            None
        };

        Self {
            analysis,
            is_user_confirmed,
            user_modified_text,
            current_qa_answer: None,
            reviewed_suggestion: None,
            is_reviewed_suggestion_valid: None,
            reviewed_suggestion_issue: None,
            expert_feedback_history: Vec::new(),
            last_modified: None,
            interaction_count: 0,
        }
    }

    /// Annotate with counts derived from the interaction log
    pub fn with_activity(mut self, activity: &SessionActivity) -> Self {
        self.interaction_count = activity.term_count(&self.analysis.term_id);
        self.last_modified = activity.term_last_modified(&self.analysis.term_id);
        self
    }

    /// Term id
    pub fn id(&self) -> &str {
        &self.analysis.term_id
    }

    /// Final compliance verdict.
    ///
    /// Priority: expert override, then user confirmation (confirmed wording
    /// counts as fixed), then the verdict of the latest review, then the
    /// original analysis.
    pub fn effective_compliance(&self) -> bool {
        if let Some(verdict) = self.analysis.expert_override {
            return verdict;
        }
        if self.is_user_confirmed {
            return true;
        }
        self.is_reviewed_suggestion_valid
            .unwrap_or(self.analysis.is_compliant)
    }

    /// Wording the user would confirm by default: their latest edit, else the
    /// server suggestion, else the original text.
    pub fn proposed_text(&self) -> &str {
        self.user_modified_text
            .as_deref()
            .or(self.analysis.modified_term.as_deref())
            .unwrap_or(&self.analysis.term_text)
    }

    pub(crate) fn touch(&mut self) {
        self.interaction_count += 1;
        self.last_modified = Some(Utc::now());
    }

    pub(crate) fn apply_answer(&mut self, answer: &str) {
        self.current_qa_answer = Some(answer.to_string());
    }

    /// A new review always voids a previous confirmation, which referred to
    /// different text.
    pub(crate) fn apply_review(&mut self, review: &ReviewResponse) {
        self.user_modified_text = Some(review.reviewed_text.clone());
        self.reviewed_suggestion = Some(review.reviewed_text.clone());
        self.is_reviewed_suggestion_valid = Some(review.is_still_compliant);
        self.reviewed_suggestion_issue = review.new_issue.clone();
        self.is_user_confirmed = false;
    }

    pub(crate) fn apply_confirmation(&mut self, final_text: &str) {
        self.is_user_confirmed = true;
        self.user_modified_text = Some(final_text.to_string());
    }

    pub(crate) fn apply_expert_feedback(
        &mut self,
        payload: &ExpertFeedbackPayload,
        feedback_id: Option<String>,
    ) {
        self.analysis.has_expert_feedback = true;
        self.analysis.expert_override = payload.feedback_data.expert_is_compliant;
        if feedback_id.is_some() {
            self.analysis.last_expert_feedback_id = feedback_id;
        }
        self.expert_feedback_history.push(payload.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ExpertFeedbackData;

    fn term(is_compliant: bool) -> Term {
        Term::from_api(ApiTerm::new("t1", "Original clause", is_compliant))
    }

    fn review(valid: bool) -> ReviewResponse {
        ReviewResponse {
            reviewed_text: "Reviewed clause".to_string(),
            is_still_compliant: valid,
            new_issue: if valid { None } else { Some("Still an issue".to_string()) },
            new_reference_number: None,
        }
    }

    fn feedback(verdict: Option<bool>) -> ExpertFeedbackPayload {
        ExpertFeedbackPayload {
            session_id: "S1".to_string(),
            term_id: "t1".to_string(),
            feedback_data: ExpertFeedbackData {
                ai_analysis_approved: Some(false),
                expert_is_compliant: verdict,
                expert_comment: "Checked".to_string(),
                expert_corrected_issue: None,
                expert_corrected_suggestion: None,
            },
        }
    }

    #[test]
    fn test_falls_back_to_original_verdict() {
        assert!(term(true).effective_compliance());
        assert!(!term(false).effective_compliance());
    }

    #[test]
    fn test_review_verdict_overrides_original() {
        let mut t = term(false);
        t.apply_review(&review(true));
        assert!(t.effective_compliance());

        let mut t = term(true);
        t.apply_review(&review(false));
        assert!(!t.effective_compliance());
    }

    #[test]
    fn test_confirmation_overrides_review_and_original() {
        let mut t = term(false);
        t.apply_review(&review(false));
        t.apply_confirmation("Final clause");
        assert!(t.effective_compliance());
    }

    #[test]
    fn test_expert_override_wins_over_everything() {
        let mut t = term(true);
        t.apply_confirmation("Final clause");
        t.apply_expert_feedback(&feedback(Some(false)), None);
        assert!(!t.effective_compliance());

        // Lower-priority changes no longer matter
        t.is_reviewed_suggestion_valid = Some(true);
        t.analysis.is_compliant = true;
        assert!(!t.effective_compliance());

        let mut t = term(false);
        t.apply_expert_feedback(&feedback(Some(true)), None);
        assert!(t.effective_compliance());
    }

    #[test]
    fn test_review_unconfirms() {
        let mut t = term(false);
        t.apply_confirmation("Final clause");
        assert!(t.is_user_confirmed);

        t.apply_review(&review(true));
        assert!(!t.is_user_confirmed);
        assert_eq!(t.user_modified_text.as_deref(), Some("Reviewed clause"));
        assert_eq!(t.reviewed_suggestion.as_deref(), Some("Reviewed clause"));
    }

    #[test]
    fn test_confirmation_keeps_exact_text() {
        let mut t = term(false);
        t.apply_review(&review(true));
        t.apply_confirmation("Different final text");
        assert_eq!(t.user_modified_text.as_deref(), Some("Different final text"));
    }

    #[test]
    fn test_expert_feedback_appends_history() {
        let mut t = term(false);
        t.apply_expert_feedback(&feedback(Some(true)), Some("fb-1".to_string()));
        t.apply_expert_feedback(&feedback(None), None);

        assert!(t.analysis.has_expert_feedback);
        assert_eq!(t.expert_feedback_history.len(), 2);
        assert_eq!(t.analysis.expert_override, None);
        assert_eq!(t.analysis.last_expert_feedback_id.as_deref(), Some("fb-1"));
    }

    #[test]
    fn test_server_confirmation_seeds_local_state() {
        let mut api = ApiTerm::new("t1", "Original", false);
        api.is_confirmed_by_user = Some(true);
        api.confirmed_modified_text = Some("Agreed wording".to_string());

        let t = Term::from_api(api);
        assert!(t.is_user_confirmed);
        assert_eq!(t.user_modified_text.as_deref(), Some("Agreed wording"));
        assert!(t.effective_compliance());
    }

    #[test]
    fn test_proposed_text_preference() {
        let mut t = Term::from_api(ApiTerm::new("t1", "Original", false).with_suggestion("Suggested"));
        assert_eq!(t.proposed_text(), "Suggested");

        t.user_modified_text = Some("Edited".to_string());
        assert_eq!(t.proposed_text(), "Edited");

        let plain = term(true);
        assert_eq!(plain.proposed_text(), "Original clause");
    }

    #[test]
    fn test_touch_bumps_count_and_timestamp() {
        let mut t = term(true);
        t.touch();
        t.touch();
        assert_eq!(t.interaction_count, 2);
        assert!(t.last_modified.is_some());
    }

    #[test]
    fn test_persisted_form_roundtrips() {
        let mut t = term(false);
        t.apply_review(&review(true));
        t.touch();

        let raw = serde_json::to_string(&t).unwrap();
        let restored: Term = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored, t);
    }
}
