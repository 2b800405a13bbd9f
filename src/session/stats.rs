use serde::{Deserialize, Serialize};

use super::term::Term;

/// Aggregate compliance figures over a term collection.
///
/// Always derived from the terms; never stored or mutated on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceStats {
    pub total_terms: usize,
    pub compliant_count: usize,
    pub non_compliant_count: usize,
    /// `compliant_count / total_terms * 100`, or 0 without terms.
    pub compliance_percentage: f64,
    pub expert_reviewed_terms: usize,
    pub user_modified_terms: usize,
}

impl ComplianceStats {
    /// Derive statistics from `terms`
    pub fn from_terms(terms: &[Term]) -> Self {
        let total_terms = terms.len();
        if total_terms == 0 {
            return Self::default();
        }

        let compliant_count = terms.iter().filter(|t| t.effective_compliance()).count();

        Self {
            total_terms,
            compliant_count,
            non_compliant_count: total_terms - compliant_count,
            compliance_percentage: compliant_count as f64 / total_terms as f64 * 100.0,
            expert_reviewed_terms: terms
                .iter()
                .filter(|t| t.analysis.has_expert_feedback)
                .count(),
            user_modified_terms: terms.iter().filter(|t| t.is_user_confirmed).count(),
        }
    }

    /// Percentage rounded to two decimals for display
    pub fn rounded_percentage(&self) -> f64 {
        (self.compliance_percentage * 100.0).round() / 100.0
    }
}
