//! HTTP client for the remote vision model.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The environment variable name for the analysis API key.
pub const API_KEY_ENV: &str = "GLASSCAM_API_KEY";

/// Default base URL for the analysis API.
pub const DEFAULT_BASE_URL: &str = "https://fal.run";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "fal-ai/moondream2/visual-query";

/// Default timeout for HTTP requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP status code for rate limiting.
const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Body sent to the analysis collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    /// Base64 image payload without any data-URL header.
    pub image: String,
    pub mime_type: String,
    pub instruction: String,
}

/// Response from the analysis collaborator.
#[derive(Debug, Deserialize)]
struct DescribeResponse {
    /// Missing text is treated like an empty description.
    #[serde(default)]
    text: String,
}

/// A vision-capable service that describes an image.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Send one request and return the raw description.
    async fn describe(&self, request: &AnalysisRequest) -> Result<String, ClientError>;
}

/// Errors returned by an [`AnalysisClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("API key not configured (set GLASSCAM_API_KEY)")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited: {message}")]
    RateLimit {
        /// Human-readable rate limit message
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },
}

/// Stand-in used when no API key is configured.
///
/// Every request fails with `ClientError::MissingApiKey`, so the camera side
/// keeps working and descriptions surface as analysis failures.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredClient;

#[async_trait]
impl AnalysisClient for UnconfiguredClient {
    async fn describe(&self, _request: &AnalysisRequest) -> Result<String, ClientError> {
        Err(ClientError::MissingApiKey)
    }
}

/// Client for a JSON-over-HTTP vision endpoint.
///
/// Sends `POST {base_url}/{model}` with `Authorization: Key <api key>`.
pub struct HttpAnalysisClient {
    api_key: String,
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for HttpAnalysisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAnalysisClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpAnalysisClient {
    /// Create a client by reading the API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingApiKey` if `GLASSCAM_API_KEY` is not set.
    pub fn new() -> Result<Self, ClientError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| ClientError::MissingApiKey)?;
        Self::with_api_key(api_key)
    }

    /// Create a client with an explicit API key and the default endpoint.
    pub fn with_api_key(api_key: String) -> Result<Self, ClientError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Create a client against a custom base URL.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, ClientError> {
        if api_key.is_empty() {
            return Err(ClientError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_client,
        })
    }

    /// Use a different model path.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, self.model.trim_start_matches('/'))
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    /// # Errors
    ///
    /// Returns `ClientError::RateLimit` on 429, `ClientError::ApiError` for any
    /// other error status, or `ClientError::HttpError` if the request or the
    /// JSON decoding fails.
    async fn describe(&self, request: &AnalysisRequest) -> Result<String, ClientError> {
        let response = self
            .http_client
            .post(self.endpoint())
            .header("Authorization", format!("Key {}", self.api_key))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();

            if status.as_u16() == HTTP_STATUS_TOO_MANY_REQUESTS {
                let retry_after_secs = parse_retry_after(&response);
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Rate limit exceeded".to_string());
                log::warn!(
                    "Rate limited by analysis API. Retry-After: {:?} seconds",
                    retry_after_secs
                );
                return Err(ClientError::RateLimit {
                    message,
                    retry_after_secs,
                });
            }

            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::ApiError(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let body: DescribeResponse = response.json().await?;
        Ok(body.text)
    }
}

/// Parse the Retry-After header value in seconds.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_api_key_uses_defaults() {
        let client = HttpAnalysisClient::with_api_key("key".to_string()).unwrap();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
        assert_eq!(client.model_name(), DEFAULT_MODEL);
        assert_eq!(
            client.endpoint(),
            "https://fal.run/fal-ai/moondream2/visual-query"
        );
    }

    #[test]
    fn test_empty_key_is_missing() {
        let result = HttpAnalysisClient::with_api_key(String::new());
        assert!(matches!(result, Err(ClientError::MissingApiKey)));
    }

    #[test]
    fn test_endpoint_normalizes_slashes() {
        let client =
            HttpAnalysisClient::with_base_url("key".to_string(), "http://localhost:9/".to_string())
                .unwrap()
                .model("/vision/describe");
        assert_eq!(client.endpoint(), "http://localhost:9/vision/describe");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = HttpAnalysisClient::with_api_key("secret-key".to_string()).unwrap();
        assert!(!format!("{:?}", client).contains("secret-key"));
    }

    #[test]
    fn test_request_serialization() {
        let request = AnalysisRequest {
            image: "AAEC".to_string(),
            mime_type: "image/jpeg".to_string(),
            instruction: "Describe".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "image": "AAEC",
                "mime_type": "image/jpeg",
                "instruction": "Describe"
            })
        );
    }

    #[test]
    fn test_response_without_text_is_empty() {
        let response: DescribeResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text, "");
    }

    #[test]
    fn test_client_error_display() {
        assert_eq!(
            ClientError::ApiError("bad request".to_string()).to_string(),
            "API error: bad request"
        );
        assert!(ClientError::MissingApiKey
            .to_string()
            .contains(API_KEY_ENV));
    }
}
