//! Detector service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use vframe_models::{Detector, DetectorSpec, ImageQuery};

use crate::error::{MlError, MlResult};
use crate::service::QueryService;
use crate::types::{CreateDetectorRequest, DetectorPage, WhoAmI};

/// Default service endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.groundlight.ai/device-api";

/// Header carrying the API token.
const TOKEN_HEADER: &str = "x-api-token";

/// Configuration for ML client.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL of the service
    pub endpoint: String,
    /// API token
    pub api_token: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for read-only requests
    pub max_retries: u32,
    /// How long the service may hold a new query open waiting for a confident result
    pub ask_wait: Duration,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_token: String::new(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            ask_wait: Duration::from_secs(10),
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("GROUNDLIGHT_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            api_token: std::env::var("GROUNDLIGHT_API_TOKEN").unwrap_or_default(),
            timeout: Duration::from_secs(
                std::env::var("ML_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            max_retries: std::env::var("ML_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            ask_wait: Duration::from_secs(
                std::env::var("ML_ASK_WAIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}

/// Client for the detector service.
#[derive(Debug, Clone)]
pub struct DetectorClient {
    http: Client,
    config: MlClientConfig,
}

impl DetectorClient {
    /// Create a new client. Fails if no API token is configured.
    pub fn new(config: MlClientConfig) -> MlResult<Self> {
        if config.api_token.trim().is_empty() {
            return Err(MlError::config(
                "no API token configured (set GROUNDLIGHT_API_TOKEN)",
            ));
        }

        let mut token = HeaderValue::from_str(config.api_token.trim())
            .map_err(|e| MlError::config(format!("invalid API token: {}", e)))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(MlClientConfig::from_env())
    }

    pub fn config(&self) -> &MlClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// Verify the endpoint is reachable and the token is accepted.
    pub async fn check_connectivity(&self) -> MlResult<()> {
        let url = self.url("/v1/me");
        let response = self
            .with_retry(|| async {
                self.http
                    .get(&url)
                    .send()
                    .await
                    .map_err(MlError::Network)
                    .and_then(reject_server_error)
            })
            .await?;
        let me: WhoAmI = parse_json(response).await?;
        info!(
            user = me.username.as_deref().unwrap_or("unknown"),
            "Connected to detector service"
        );
        Ok(())
    }

    /// Look up a detector by name, creating it if it does not exist.
    pub async fn get_or_create_detector(&self, spec: &DetectorSpec) -> MlResult<Detector> {
        let url = self.url("/v1/detectors");

        let response = self
            .with_retry(|| async {
                self.http
                    .get(&url)
                    .query(&[("name", spec.name.as_str())])
                    .send()
                    .await
                    .map_err(MlError::Network)
                    .and_then(reject_server_error)
            })
            .await?;
        let page: DetectorPage = parse_json(response).await?;

        if let Some(existing) = page.results.into_iter().find(|d| d.name == spec.name) {
            debug!(detector_id = %existing.id, name = %existing.name, "Using existing detector");
            return Ok(existing);
        }

        info!(name = %spec.name, "Creating detector");
        let response = self
            .http
            .post(&url)
            .json(&CreateDetectorRequest::from(spec))
            .send()
            .await?;
        parse_json(response).await
    }

    /// Submit an image to a detector.
    ///
    /// Not retried: a lost response after the service accepted the image
    /// would otherwise create a second query for the same frame.
    pub async fn ask_image_query(&self, detector: &Detector, image: &[u8]) -> MlResult<ImageQuery> {
        let url = self.url("/v1/image-queries");
        let wait = self.config.ask_wait.as_secs().to_string();

        debug!(detector_id = %detector.id, bytes = image.len(), "Submitting image query");

        let response = self
            .http
            .post(&url)
            .query(&[("detector_id", detector.id.as_str()), ("wait", wait.as_str())])
            .header(CONTENT_TYPE, "image/jpeg")
            .body(image.to_vec())
            .send()
            .await?;
        parse_json(response).await
    }

    /// Fetch the current state of an existing image query.
    pub async fn get_image_query(&self, query_id: &str) -> MlResult<ImageQuery> {
        let url = self.url(&format!("/v1/image-queries/{}", query_id));

        let response = self
            .with_retry(|| async {
                self.http
                    .get(&url)
                    .send()
                    .await
                    .map_err(MlError::Network)
                    .and_then(reject_server_error)
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(MlError::QueryNotFound(query_id.to_string()));
        }
        parse_json(response).await
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "ML request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| MlError::RequestFailed("Unknown error".to_string())))
    }
}

#[async_trait]
impl QueryService for DetectorClient {
    async fn ask(&self, detector: &Detector, image: &[u8]) -> MlResult<ImageQuery> {
        self.ask_image_query(detector, image).await
    }

    async fn fetch(&self, query_id: &str) -> MlResult<ImageQuery> {
        self.get_image_query(query_id).await
    }
}

/// Turn a 5xx response into a retryable error.
fn reject_server_error(response: Response) -> MlResult<Response> {
    if response.status().is_server_error() {
        Err(MlError::ServiceUnavailable(format!(
            "service returned {}",
            response.status()
        )))
    } else {
        Ok(response)
    }
}

/// Map the status code, then decode the JSON body.
async fn parse_json<T: DeserializeOwned>(response: Response) -> MlResult<T> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(MlError::Unauthorized(format!("service returned {}", status)));
    }
    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(MlError::ServiceUnavailable(format!("{}: {}", status, body)));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MlError::RequestFailed(format!(
            "service returned {}: {}",
            status, body
        )));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        MlError::InvalidResponse(format!("{} (body: {})", e, String::from_utf8_lossy(&bytes)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MlClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let err = DetectorClient::new(MlClientConfig::default()).unwrap_err();
        assert!(matches!(err, MlError::Config(_)));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = DetectorClient::new(MlClientConfig {
            endpoint: "http://localhost:9000/".to_string(),
            api_token: "token".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.url("/v1/me"), "http://localhost:9000/v1/me");
    }
}
