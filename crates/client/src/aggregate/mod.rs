//! Price aggregation API client.
//!
//! ### Endpoint
//!
//! - `POST {api_base}/aggregate-scrape` with `{link}` or `{productName}`
//! - Response: `{success, sources: {<platformId>: {success, data}}}`
//!
//! The response is returned as raw JSON. Interpreting it is the
//! normalizer's job, which tolerates any shape; this client only fails on
//! transport errors, error statuses, or a body that is not JSON at all.

pub mod error;
pub mod request;

pub use error::AggregateError;
pub use request::AggregateRequest;

use async_trait::async_trait;
use pricewatch_core::{AppConfig, ProductRequest};
use reqwest::header;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default base URL of the aggregation API.
const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "pricewatch/0.1";

/// Something that can produce a raw aggregation envelope for a lookup.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch(&self, request: &ProductRequest) -> Result<serde_json::Value, AggregateError>;
}

/// Aggregation client configuration.
#[derive(Debug, Clone)]
pub struct AggregateConfig {
    /// Base URL (default: http://localhost:5000/api).
    pub base_url: String,
    /// Request timeout (default: 120s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl From<&AppConfig> for AggregateConfig {
    fn from(config: &AppConfig) -> Self {
        Self { base_url: config.api_base.clone(), timeout: config.timeout(), user_agent: config.user_agent.clone() }
    }
}

/// Aggregation API client.
#[derive(Debug, Clone)]
pub struct AggregateClient {
    http: reqwest::Client,
    config: AggregateConfig,
}

impl AggregateClient {
    /// Create a new client with the given configuration.
    pub fn new(config: AggregateConfig) -> Result<Self, AggregateError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| AggregateError::Network(Arc::new(e)))?;

        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/aggregate-scrape", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ProductSource for AggregateClient {
    async fn fetch(&self, request: &ProductRequest) -> Result<serde_json::Value, AggregateError> {
        let body = AggregateRequest::for_lookup(request)?;
        let start = Instant::now();

        tracing::debug!(?body, "requesting aggregate scrape");

        let http_response = self
            .http
            .post(self.endpoint())
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = http_response.status();
        tracing::debug!(%status, "aggregate scrape response status");

        if status.is_client_error() || status.is_server_error() {
            return Err(AggregateError::HttpError { status: status.as_u16() });
        }

        let bytes = http_response.bytes().await?;
        let envelope: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| AggregateError::Parse(e.to_string()))?;

        tracing::debug!(elapsed = ?start.elapsed(), "aggregate scrape completed");

        Ok(envelope)
    }
}
