use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// One analyzed term as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiTerm {
    pub term_id: String,
    pub term_text: String,
    /// Original verdict from the compliance ruleset.
    #[serde(rename = "is_valid_sharia")]
    pub is_compliant: bool,
    /// Explanation of the issue when the term is not compliant.
    #[serde(rename = "sharia_issue", default, skip_serializing_if = "Option::is_none")]
    pub compliance_issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    /// Replacement wording suggested by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_confirmed_by_user: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_modified_text: Option<String>,
    #[serde(default)]
    pub has_expert_feedback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_expert_feedback_id: Option<String>,
    /// Expert verdict that overrides every other source when set.
    #[serde(
        rename = "expert_override_is_valid_sharia",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expert_override: Option<bool>,
}

impl ApiTerm {
    /// Create a term with only the required fields set
    pub fn new(term_id: impl Into<String>, term_text: impl Into<String>, is_compliant: bool) -> Self {
        Self {
            term_id: term_id.into(),
            term_text: term_text.into(),
            is_compliant,
            compliance_issue: None,
            reference_number: None,
            modified_term: None,
            is_confirmed_by_user: None,
            confirmed_modified_text: None,
            has_expert_feedback: false,
            last_expert_feedback_id: None,
            expert_override: None,
        }
    }

    /// Set the compliance issue explanation
    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.compliance_issue = Some(issue.into());
        self
    }

    /// Set the suggested replacement text
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.modified_term = Some(suggestion.into());
        self
    }
}

/// Location and format of a stored document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub url: String,
    #[serde(default)]
    pub public_id: String,
    #[serde(default)]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_facing_filename: Option<String>,
}

impl FileInfo {
    /// A docx document reachable at `url`
    pub fn docx(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            public_id: String::new(),
            format: "docx".to_string(),
            user_facing_filename: None,
        }
    }
}

/// Generated output document slot in session metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContractInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docx_cloudinary_info: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txt_cloudinary_info: Option<FileInfo>,
}

/// Session metadata returned by `GET /session/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDetails {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub analysis_timestamp: String,
    #[serde(default)]
    pub analysis_results: Vec<ApiTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_percentage: Option<f64>,
    #[serde(default)]
    pub detected_contract_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_contract_plain: Option<String>,
    #[serde(default)]
    pub original_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_contract_markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_cloudinary_info: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_results_cloudinary_info: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_contract_info: Option<GeneratedContractInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_contract_info: Option<GeneratedContractInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_preview_info: Option<PreviewInfo>,
}

impl SessionDetails {
    /// Minimal metadata for a session id
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// Preview documents for generated contracts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked: Option<FileInfo>,
}

/// Which generated document a call refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Modified,
    Marked,
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractKind::Modified => write!(f, "modified"),
            ContractKind::Marked => write!(f, "marked"),
        }
    }
}

impl std::str::FromStr for ContractKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "modified" => Ok(ContractKind::Modified),
            "marked" => Ok(ContractKind::Marked),
            _ => Err(format!("Unknown contract kind: {}", s)),
        }
    }
}

/// Response of `POST /analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub message: String,
    pub session_id: String,
    #[serde(default)]
    pub analysis_results: Vec<ApiTerm>,
    #[serde(default)]
    pub detected_contract_language: String,
    #[serde(default)]
    pub original_contract_plain: Option<String>,
    #[serde(default)]
    pub original_cloudinary_url: Option<String>,
}

/// Body of `POST /interact`. Without a term the question is about the whole contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionRequest {
    pub session_id: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_text: Option<String>,
}

impl QuestionRequest {
    /// A contract-level question
    pub fn general(session_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            question: question.into(),
            term_id: None,
            term_text: None,
        }
    }

    /// Scope the question to one term
    pub fn about_term(mut self, term_id: impl Into<String>, term_text: impl Into<String>) -> Self {
        self.term_id = Some(term_id.into());
        self.term_text = Some(term_text.into());
        self
    }
}

/// Body of `POST /review_modification`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRequest {
    pub session_id: String,
    pub term_id: String,
    pub user_modified_text: String,
    pub original_term_text: String,
}

/// Response of `POST /review_modification`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReviewResponse {
    pub reviewed_text: String,
    #[serde(rename = "is_still_valid_sharia")]
    pub is_still_compliant: bool,
    #[serde(rename = "new_sharia_issue", default)]
    pub new_issue: Option<String>,
    #[serde(default)]
    pub new_reference_number: Option<String>,
}

/// Body of `POST /confirm_modification`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmRequest {
    pub session_id: String,
    pub term_id: String,
    pub modified_text: String,
}

/// Response of `POST /confirm_modification`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfirmResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Response of the two contract generation endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "modified_docx_cloudinary_url", alias = "marked_docx_cloudinary_url")]
    pub docx_url: Option<String>,
    #[serde(default, alias = "modified_txt_cloudinary_url")]
    pub txt_url: Option<String>,
}

/// Expert assessment of one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertFeedbackData {
    /// Whether the expert agrees with the automated analysis.
    pub ai_analysis_approved: Option<bool>,
    /// Expert verdict; becomes the term's override when set.
    #[serde(rename = "expertIsValidSharia", default, skip_serializing_if = "Option::is_none")]
    pub expert_is_compliant: Option<bool>,
    #[serde(default)]
    pub expert_comment: String,
    #[serde(rename = "expertCorrectedShariaIssue", default, skip_serializing_if = "Option::is_none")]
    pub expert_corrected_issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expert_corrected_suggestion: Option<String>,
}

/// Body of `POST /feedback/expert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertFeedbackPayload {
    pub session_id: String,
    pub term_id: String,
    pub feedback_data: ExpertFeedbackData,
}

/// Response of `POST /feedback/expert`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpertFeedbackResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub feedback_id: Option<String>,
}

/// Account-wide statistics from `GET /api/stats/user`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    #[serde(default)]
    pub total_sessions: u64,
    #[serde(default)]
    pub total_terms: u64,
    #[serde(default)]
    pub compliance_rate: f64,
    #[serde(default)]
    pub average_processing_time: f64,
}

/// Where the bytes of a candidate file come from.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// Contents already in memory.
    Bytes(Vec<u8>),
    /// A local file streamed at upload time.
    Path(PathBuf),
}

/// A document to analyze, as produced by a picker or camera capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFile {
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
    pub source: FileSource,
    /// Page image locations when the document was captured page by page.
    pub pages: Vec<String>,
    /// Capture metadata forwarded verbatim.
    pub metadata: Option<serde_json::Value>,
}

impl CandidateFile {
    /// A file held in memory
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: Some(bytes.len() as u64),
            source: FileSource::Bytes(bytes),
            pages: Vec::new(),
            metadata: None,
        }
    }

    /// A file on disk
    pub fn from_path(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            mime_type: mime_type.into(),
            size: None,
            source: FileSource::Path(path),
            pages: Vec::new(),
            metadata: None,
        }
    }

    /// Mark the file as a multi-page capture
    pub fn with_pages(mut self, pages: Vec<String>) -> Self {
        self.pages = pages;
        self
    }

    /// Attach capture metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether the upload carries page-by-page capture data
    pub fn is_multi_page(&self) -> bool {
        !self.pages.is_empty()
    }
}

/// Coarse upload milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    /// Multipart body assembled.
    Prepared,
    /// Auth and fixed headers resolved.
    HeadersReady,
    /// Request written, waiting for the analysis.
    Sent,
    /// Response received.
    Completed,
    /// Upload aborted.
    Failed,
}

impl UploadStage {
    /// Progress percentage shown for this stage
    pub fn percent(&self) -> u8 {
        match self {
            UploadStage::Prepared => 30,
            UploadStage::HeadersReady => 50,
            UploadStage::Sent => 70,
            UploadStage::Completed => 100,
            UploadStage::Failed => 0,
        }
    }
}

/// Callback receiving upload milestones.
pub type ProgressSink = Arc<dyn Fn(UploadStage) + Send + Sync>;
