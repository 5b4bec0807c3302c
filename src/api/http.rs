//! HTTP client for the evaluation service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::{ErrorContext, ServiceError};
use super::types::{EvaluationConfig, EvaluationRequest, EvaluationResponse};
use super::{ConfigService, EvaluationService};

/// Maximum allowed response body length (4MB).
const MAX_RESPONSE_LEN: usize = 4 * 1_024 * 1_024;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service root including the API prefix, e.g. `http://host:8000/api`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Read `INSPECTION_API_BASE_URL` and `INSPECTION_API_TIMEOUT_SECONDS`,
    /// falling back to the defaults.
    pub fn from_env() -> Self {
        let base_url = std::env::var("INSPECTION_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout = std::env::var("INSPECTION_API_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Self { base_url, timeout }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// reqwest-backed implementation of both service traits.
#[derive(Debug, Clone)]
pub struct HttpEvaluationClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEvaluationClient {
    /// Create with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        Self::with_config(ClientConfig::new(base_url))
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::with_config(ClientConfig::from_env())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self, ServiceError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ServiceError::config("base URL is empty"));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ServiceError::config(format!(
                "base URL must start with http:// or https://: {base_url}"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ServiceError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn config_url(&self) -> String {
        format!("{}/evaluation/config", self.base_url)
    }

    fn evaluate_url(&self) -> String {
        format!("{}/evaluation/evaluate", self.base_url)
    }

    /// Extract request ID from response headers.
    fn extract_request_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    /// Read the body under the size cap, then decode it or map the failure.
    async fn decode<T: DeserializeOwned>(mut response: reqwest::Response) -> Result<T, ServiceError> {
        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(ServiceError::TooLarge(new_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        if !status.is_success() {
            let ctx = ErrorContext::new().with_status(status.as_u16());
            let ctx = match request_id {
                Some(id) => ctx.with_request_id(id),
                None => ctx,
            };
            let message = error_detail(&bytes);
            return Err(ServiceError::api_with_context(status.as_u16(), message, ctx));
        }

        serde_json::from_slice(&bytes).map_err(|e| ServiceError::decode(e.to_string()))
    }
}

// =============================================================================
// ERROR BODIES
// =============================================================================

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Pull a readable message out of a `{"detail": ...}` error body.
///
/// `detail` is either a plain string or a list of validation items, each
/// with a `msg` field.
fn error_detail(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    match parsed.detail? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Array(items) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .map(str::to_string)
                .collect();
            if msgs.is_empty() {
                None
            } else {
                Some(msgs.join("; "))
            }
        }
        _ => None,
    }
}

// =============================================================================
// SERVICE IMPLS
// =============================================================================

#[async_trait]
impl ConfigService for HttpEvaluationClient {
    async fn fetch_config(&self) -> Result<EvaluationConfig, ServiceError> {
        let response = self.client.get(self.config_url()).send().await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl EvaluationService for HttpEvaluationClient {
    async fn submit_evaluation(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResponse, ServiceError> {
        let response = self
            .client
            .post(self.evaluate_url())
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }
}
