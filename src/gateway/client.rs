use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::auth::TokenProvider;
use super::types::{
    AnalyzeResponse, ApiTerm, CandidateFile, ConfirmRequest, ConfirmResponse,
    ExpertFeedbackPayload, ExpertFeedbackResponse, FileSource, GenerateResponse, ProgressSink,
    QuestionRequest, ReviewRequest, ReviewResponse, SessionDetails, UploadStage, UserStats,
};
use super::ComplianceApi;
use crate::config::{ApiConfig, RequestConfig};
use crate::error::{GatewayError, GatewayResult};

/// Header that suppresses the interstitial page of the HTTP tunnel in front
/// of the service. Sent on every call.
pub const TUNNEL_WARNING_HEADER: (&str, &str) = ("ngrok-skip-browser-warning", "true");

/// HTTP client for the compliance analysis service
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    request_config: RequestConfig,
}

impl ApiClient {
    /// Create a new client
    pub fn new(
        config: &ApiConfig,
        request_config: RequestConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(GatewayError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the fixed header and, when available, the bearer token.
    /// A failing token provider degrades to an anonymous request.
    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(TUNNEL_WARNING_HEADER.0, TUNNEL_WARNING_HEADER.1);
        match self.tokens.token().await {
            Ok(Some(token)) => builder.header("Authorization", format!("Bearer {}", token)),
            Ok(None) => builder,
            Err(e) => {
                warn!(error = %e, "Failed to read auth token, sending request without it");
                builder
            }
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else if e.is_connect() || e.is_request() {
            GatewayError::Transport {
                message: e.to_string(),
            }
        } else {
            GatewayError::Http(e)
        }
    }

    /// GET with retries on transport failures. Server responses are never retried.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, resource: &str) -> GatewayResult<T> {
        let url = self.url(path);
        let mut retries = 0;

        loop {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    url = %url,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            let result = self.execute_get(&url, resource).await;
            let latency = start.elapsed();

            match result {
                Ok(value) => {
                    debug!(url = %url, latency_ms = latency.as_millis(), "GET succeeded");
                    return Ok(value);
                }
                Err(e) if e.is_transport() && retries < self.request_config.max_retries => {
                    warn!(
                        url = %url,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "GET failed"
                    );
                    retries += 1;
                }
                Err(e) => {
                    error!(url = %url, error = %e, latency_ms = latency.as_millis(), "GET failed");
                    return Err(e);
                }
            }
        }
    }

    async fn execute_get<T: DeserializeOwned>(&self, url: &str, resource: &str) -> GatewayResult<T> {
        let response = self
            .authorize(self.client.get(url))
            .await
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound {
                resource: resource.to_string(),
            });
        }

        decode_body(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> GatewayResult<T> {
        let url = self.url(path);
        let start = Instant::now();

        let response = self
            .authorize(self.client.post(&url))
            .await
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let result = decode_body(response).await;
        match &result {
            Ok(_) => debug!(
                url = %url,
                latency_ms = start.elapsed().as_millis(),
                "POST succeeded"
            ),
            Err(e) => error!(
                url = %url,
                error = %e,
                latency_ms = start.elapsed().as_millis(),
                "POST failed"
            ),
        }
        result
    }

    /// Run a supplementary read under the short timeout, degrading to the default.
    async fn supplementary_get<T: DeserializeOwned + Default>(&self, path: &str) -> T {
        let limit = Duration::from_millis(self.request_config.supplementary_timeout_ms);
        let url = self.url(path);

        let request = async {
            let response = self
                .authorize(self.client.get(&url))
                .await
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;
            decode_body::<T>(response).await
        };

        match tokio::time::timeout(limit, request).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "Supplementary request failed, using default");
                T::default()
            }
            Err(_) => {
                warn!(
                    url = %url,
                    timeout_ms = limit.as_millis(),
                    "Supplementary request timed out, using default"
                );
                T::default()
            }
        }
    }

    async fn build_upload_form(&self, file: CandidateFile) -> GatewayResult<Form> {
        let multi_page = file.is_multi_page();

        let bytes = match file.source {
            FileSource::Bytes(bytes) => bytes,
            FileSource::Path(path) => {
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| GatewayError::Upload {
                        message: format!("Failed to read {}: {}", path.display(), e),
                    })?
            }
        };

        let file_name = match (file.name.is_empty(), multi_page) {
            (false, _) => file.name,
            (true, true) => format!("contract_multipage_{}.txt", Uuid::new_v4()),
            (true, false) => format!("upload_{}.jpg", Uuid::new_v4()),
        };
        let mime_type = match (file.mime_type.is_empty(), multi_page) {
            (false, _) => file.mime_type,
            (true, true) => "text/plain".to_string(),
            (true, false) => "image/jpeg".to_string(),
        };

        debug!(
            file_name = %file_name,
            mime_type = %mime_type,
            bytes = bytes.len(),
            pages = file.pages.len(),
            "Building upload form"
        );

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&mime_type)
            .map_err(|e| GatewayError::Upload {
                message: format!("Invalid MIME type '{}': {}", mime_type, e),
            })?;

        let mut form = Form::new().part("file", part);
        if multi_page {
            form = form
                .text("upload_type", "multi-page-images")
                .text("total_pages", file.pages.len().to_string());
        } else if let Some(metadata) = file.metadata {
            form = form.text("metadata", metadata.to_string());
        }

        Ok(form)
    }

    async fn upload(
        &self,
        file: CandidateFile,
        report: &(dyn Fn(UploadStage) + Send + Sync),
    ) -> GatewayResult<AnalyzeResponse> {
        let url = self.url("/analyze");
        let form = self.build_upload_form(file).await?;
        report(UploadStage::Prepared);

        let builder = self.authorize(self.client.post(&url)).await;
        report(UploadStage::HeadersReady);

        report(UploadStage::Sent);
        let response = builder.multipart(form).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                GatewayError::Upload {
                    message: e.to_string(),
                }
            }
        })?;
        report(UploadStage::Completed);

        decode_body(response).await
    }
}

/// Turn a non-2xx response into a [`GatewayError::Server`], preferring the
/// `error` field of a JSON body, then the raw body, then the status text.
async fn server_error(response: Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    GatewayError::Server {
        status: status.as_u16(),
        message: error_message(status, &body),
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let from_json = value
            .get("error")
            .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(|m| m.as_str())))
            .or_else(|| value.get("message").and_then(|m| m.as_str()));
        if let Some(message) = from_json {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()))
}

/// Decode a successful body as JSON regardless of whether the server labelled
/// it `application/json` or plain text.
async fn decode_body<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    if !response.status().is_success() {
        return Err(server_error(response).await);
    }

    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);

    if is_json {
        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    } else {
        let text = response.text().await.map_err(GatewayError::Http)?;
        serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse {
            message: format!("Failed to parse non-JSON response: {}", e),
        })
    }
}

#[async_trait]
impl ComplianceApi for ApiClient {
    async fn upload_contract(
        &self,
        file: CandidateFile,
        progress: Option<ProgressSink>,
    ) -> GatewayResult<AnalyzeResponse> {
        let start = Instant::now();
        let file_name = file.name.clone();
        let report = move |stage: UploadStage| {
            if let Some(sink) = &progress {
                sink(stage);
            }
        };

        match self.upload(file, &report).await {
            Ok(response) => {
                info!(
                    session_id = %response.session_id,
                    file_name = %file_name,
                    terms = response.analysis_results.len(),
                    latency_ms = start.elapsed().as_millis(),
                    "Contract uploaded and analyzed"
                );
                Ok(response)
            }
            Err(e) => {
                report(UploadStage::Failed);
                error!(
                    file_name = %file_name,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Contract upload failed"
                );
                Err(e)
            }
        }
    }

    async fn session_details(&self, session_id: &str) -> GatewayResult<SessionDetails> {
        self.get_json(
            &format!("/session/{}", session_id),
            &format!("session {}", session_id),
        )
        .await
    }

    async fn session_terms(&self, session_id: &str) -> GatewayResult<Vec<ApiTerm>> {
        self.get_json(
            &format!("/terms/{}", session_id),
            &format!("terms of session {}", session_id),
        )
        .await
    }

    async fn ask_question(&self, request: QuestionRequest) -> GatewayResult<String> {
        let url = self.url("/interact");
        debug!(
            session_id = %request.session_id,
            term_id = ?request.term_id,
            "Asking question"
        );

        let response = self
            .authorize(self.client.post(&url))
            .await
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(GatewayError::Http)?;

        if !status.is_success() {
            let message = if text.trim().is_empty() {
                "Failed to ask question".to_string()
            } else {
                error_message(status, &text)
            };
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(text)
    }

    async fn review_modification(&self, request: ReviewRequest) -> GatewayResult<ReviewResponse> {
        self.post_json("/review_modification", &request).await
    }

    async fn confirm_modification(
        &self,
        request: ConfirmRequest,
    ) -> GatewayResult<ConfirmResponse> {
        self.post_json("/confirm_modification", &request).await
    }

    async fn generate_modified_contract(
        &self,
        session_id: &str,
    ) -> GatewayResult<GenerateResponse> {
        self.post_json(
            "/generate_modified_contract",
            &serde_json::json!({ "session_id": session_id }),
        )
        .await
    }

    async fn generate_marked_contract(&self, session_id: &str) -> GatewayResult<GenerateResponse> {
        self.post_json(
            "/generate_marked_contract",
            &serde_json::json!({ "session_id": session_id }),
        )
        .await
    }

    async fn submit_expert_feedback(
        &self,
        payload: ExpertFeedbackPayload,
    ) -> GatewayResult<ExpertFeedbackResponse> {
        self.post_json("/feedback/expert", &payload).await
    }

    async fn session_history(&self) -> Vec<SessionDetails> {
        self.supplementary_get("/api/history").await
    }

    async fn user_stats(&self) -> UserStats {
        self.supplementary_get("/api/stats/user").await
    }
}
