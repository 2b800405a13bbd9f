//! Unit tests for gateway wire types.
//!
//! Covers field renames against the service's JSON, defaults for optional
//! fields, and the candidate-file/progress helpers.

use super::*;
use serde_json::json;

// ============================================================================
// ApiTerm tests
// ============================================================================

#[test]
fn test_api_term_deserializes_wire_names() {
    let term: ApiTerm = serde_json::from_value(json!({
        "term_id": "t1",
        "term_text": "Late payment incurs 5% interest.",
        "is_valid_sharia": false,
        "sharia_issue": "Interest on late payment",
        "reference_number": "AAOIFI 8",
        "modified_term": "Late payment incurs a fixed charity donation.",
        "expert_override_is_valid_sharia": null
    }))
    .unwrap();

    assert_eq!(term.term_id, "t1");
    assert!(!term.is_compliant);
    assert_eq!(term.compliance_issue.as_deref(), Some("Interest on late payment"));
    assert_eq!(
        term.modified_term.as_deref(),
        Some("Late payment incurs a fixed charity donation.")
    );
    assert!(!term.has_expert_feedback);
    assert_eq!(term.expert_override, None);
}

#[test]
fn test_api_term_serializes_back_to_wire_names() {
    let term = ApiTerm::new("t1", "text", true).with_issue("none");
    let value = serde_json::to_value(&term).unwrap();

    assert_eq!(value["is_valid_sharia"], json!(true));
    assert_eq!(value["sharia_issue"], json!("none"));
    assert!(value.get("expert_override_is_valid_sharia").is_none());
}

#[test]
fn test_api_term_expert_override_false_is_kept() {
    let term: ApiTerm = serde_json::from_value(json!({
        "term_id": "t1",
        "term_text": "text",
        "is_valid_sharia": true,
        "has_expert_feedback": true,
        "expert_override_is_valid_sharia": false
    }))
    .unwrap();

    assert!(term.has_expert_feedback);
    assert_eq!(term.expert_override, Some(false));
}

// ============================================================================
// SessionDetails tests
// ============================================================================

#[test]
fn test_session_details_minimal_payload() {
    let details: SessionDetails = serde_json::from_value(json!({
        "session_id": "S1"
    }))
    .unwrap();

    assert_eq!(details.session_id, "S1");
    assert!(details.analysis_results.is_empty());
    assert!(details.modified_contract_info.is_none());
    assert!(details.compliance_percentage.is_none());
}

#[test]
fn test_session_details_full_payload() {
    let details: SessionDetails = serde_json::from_value(json!({
        "_id": "abc",
        "session_id": "S1",
        "original_filename": "lease.pdf",
        "analysis_timestamp": "2024-05-01T10:00:00Z",
        "analysis_results": [
            {"term_id": "t1", "term_text": "x", "is_valid_sharia": true}
        ],
        "compliance_percentage": 66.7,
        "detected_contract_language": "ar",
        "original_format": "pdf",
        "modified_contract_info": {
            "docx_cloudinary_info": {"url": "https://files/m.docx", "public_id": "m", "format": "docx"}
        }
    }))
    .unwrap();

    assert_eq!(details.record_id.as_deref(), Some("abc"));
    assert_eq!(details.analysis_results.len(), 1);
    assert_eq!(details.detected_contract_language, "ar");
    let info = details.modified_contract_info.unwrap();
    assert_eq!(info.docx_cloudinary_info.unwrap().url, "https://files/m.docx");
}

// ============================================================================
// Response tests
// ============================================================================

#[test]
fn test_review_response_renames() {
    let review: ReviewResponse = serde_json::from_value(json!({
        "reviewed_text": "Reviewed",
        "is_still_valid_sharia": false,
        "new_sharia_issue": "Still ambiguous"
    }))
    .unwrap();

    assert_eq!(review.reviewed_text, "Reviewed");
    assert!(!review.is_still_compliant);
    assert_eq!(review.new_issue.as_deref(), Some("Still ambiguous"));
}

#[test]
fn test_generate_response_accepts_both_url_fields() {
    let modified: GenerateResponse = serde_json::from_value(json!({
        "success": true,
        "message": "ok",
        "modified_docx_cloudinary_url": "https://files/m.docx",
        "modified_txt_cloudinary_url": "https://files/m.txt"
    }))
    .unwrap();
    assert_eq!(modified.docx_url.as_deref(), Some("https://files/m.docx"));
    assert_eq!(modified.txt_url.as_deref(), Some("https://files/m.txt"));

    let marked: GenerateResponse = serde_json::from_value(json!({
        "success": true,
        "message": "ok",
        "marked_docx_cloudinary_url": "https://files/k.docx"
    }))
    .unwrap();
    assert_eq!(marked.docx_url.as_deref(), Some("https://files/k.docx"));
    assert!(marked.txt_url.is_none());
}

#[test]
fn test_expert_feedback_payload_uses_camel_case_data() {
    let payload = ExpertFeedbackPayload {
        session_id: "S1".to_string(),
        term_id: "t1".to_string(),
        feedback_data: ExpertFeedbackData {
            ai_analysis_approved: Some(false),
            expert_is_compliant: Some(true),
            expert_comment: "Acceptable under necessity".to_string(),
            expert_corrected_issue: None,
            expert_corrected_suggestion: None,
        },
    };

    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(value["feedback_data"]["aiAnalysisApproved"], json!(false));
    assert_eq!(value["feedback_data"]["expertIsValidSharia"], json!(true));
    assert_eq!(
        value["feedback_data"]["expertComment"],
        json!("Acceptable under necessity")
    );
}

#[test]
fn test_user_stats_defaults() {
    let stats: UserStats = serde_json::from_value(json!({"totalSessions": 4})).unwrap();
    assert_eq!(stats.total_sessions, 4);
    assert_eq!(stats.total_terms, 0);
}

// ============================================================================
// Request tests
// ============================================================================

#[test]
fn test_general_question_omits_term_fields() {
    let request = QuestionRequest::general("S1", "Is this lease valid?");
    let value = serde_json::to_value(&request).unwrap();
    assert!(value.get("term_id").is_none());
    assert!(value.get("term_text").is_none());

    let scoped = request.about_term("t1", "Clause text");
    let value = serde_json::to_value(&scoped).unwrap();
    assert_eq!(value["term_id"], json!("t1"));
    assert_eq!(value["term_text"], json!("Clause text"));
}

// ============================================================================
// CandidateFile / UploadStage tests
// ============================================================================

#[test]
fn test_candidate_file_from_bytes() {
    let file = CandidateFile::from_bytes("lease.pdf", "application/pdf", vec![1, 2, 3]);
    assert_eq!(file.size, Some(3));
    assert!(!file.is_multi_page());
}

#[test]
fn test_candidate_file_from_path_takes_file_name() {
    let file = CandidateFile::from_path("/tmp/contracts/lease.docx", "application/msword");
    assert_eq!(file.name, "lease.docx");
    assert_eq!(file.size, None);
}

#[test]
fn test_candidate_file_with_pages() {
    let file = CandidateFile::from_bytes("scan.txt", "text/plain", vec![])
        .with_pages(vec!["page1.jpg".to_string(), "page2.jpg".to_string()]);
    assert!(file.is_multi_page());
}

#[test]
fn test_upload_stage_progress_is_monotonic() {
    let stages = [
        UploadStage::Prepared,
        UploadStage::HeadersReady,
        UploadStage::Sent,
        UploadStage::Completed,
    ];
    let percents: Vec<u8> = stages.iter().map(|s| s.percent()).collect();
    assert!(percents.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(UploadStage::Completed.percent(), 100);
    assert_eq!(UploadStage::Failed.percent(), 0);
}

#[test]
fn test_contract_kind_parse_and_display() {
    assert_eq!("Modified".parse::<ContractKind>().unwrap(), ContractKind::Modified);
    assert_eq!("marked".parse::<ContractKind>().unwrap(), ContractKind::Marked);
    assert!("other".parse::<ContractKind>().is_err());
    assert_eq!(ContractKind::Marked.to_string(), "marked");
}
