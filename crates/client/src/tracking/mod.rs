//! Tracking API client.
//!
//! ### Endpoints
//!
//! - `POST {api_base}/tracking` creates a track from a comparison
//! - `GET {api_base}/tracking` lists the user's tracks
//! - `DELETE {api_base}/tracking/{id}` removes one
//!
//! All three are bearer-authenticated. A 401 maps to
//! [`TrackingError::Unauthorized`] so callers can drop the session.

pub mod error;
pub mod types;

pub use error::TrackingError;
pub use types::{PlatformSnapshot, TrackedProduct, TrackingRequest, parse_track_list};

use async_trait::async_trait;
use reqwest::{StatusCode, Url, header};
use serde_json::Value;
use std::sync::Arc;

use crate::aggregate::AggregateConfig;

/// Operations against the tracking backend.
#[async_trait]
pub trait TrackingApi: Send + Sync {
    async fn create(&self, token: &str, request: &TrackingRequest) -> Result<(), TrackingError>;

    async fn list(&self, token: &str) -> Result<Vec<TrackedProduct>, TrackingError>;

    async fn delete(&self, token: &str, id: &str) -> Result<(), TrackingError>;
}

/// Tracking API client. Shares its configuration with the aggregation client.
#[derive(Debug, Clone)]
pub struct TrackingClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TrackingClient {
    pub fn new(config: AggregateConfig) -> Result<Self, TrackingError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| TrackingError::Network(Arc::new(e)))?;

        let base_url = Url::parse(&config.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| TrackingError::InvalidUrl(config.base_url.clone()))?;

        Ok(Self { http, base_url })
    }

    /// `{base}/tracking`, plus `/{id}` as one percent-encoded segment.
    fn endpoint(&self, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("tracking");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    fn collection_url(&self) -> Url {
        self.endpoint(None)
    }

    fn item_url(&self, id: &str) -> Url {
        self.endpoint(Some(id))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TrackingError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("tracking request unauthorized");
            return Err(TrackingError::Unauthorized);
        }
        if status.is_client_error() || status.is_server_error() {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string));
            return Err(TrackingError::HttpError { status: status.as_u16(), message });
        }
        Ok(response)
    }
}

#[async_trait]
impl TrackingApi for TrackingClient {
    async fn create(&self, token: &str, request: &TrackingRequest) -> Result<(), TrackingError> {
        tracing::debug!(product = %request.product_name, platforms = request.platforms.len(), "creating track");

        let response = self.http.post(self.collection_url()).bearer_auth(token).json(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list(&self, token: &str) -> Result<Vec<TrackedProduct>, TrackingError> {
        let response = self
            .http
            .get(self.collection_url())
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let bytes = Self::check(response).await?.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|e| TrackingError::Parse(e.to_string()))?;

        let tracks = parse_track_list(&body)?;
        tracing::debug!(count = tracks.len(), "listed tracks");
        Ok(tracks)
    }

    async fn delete(&self, token: &str, id: &str) -> Result<(), TrackingError> {
        let response = self.http.delete(self.item_url(id)).bearer_auth(token).send().await?;
        Self::check(response).await?;
        tracing::debug!(id, "deleted track");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = TrackingClient::new(AggregateConfig {
            base_url: "http://localhost:5000/api/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.collection_url().as_str(), "http://localhost:5000/api/tracking");
        assert_eq!(client.item_url("abc").as_str(), "http://localhost:5000/api/tracking/abc");
    }

    #[test]
    fn test_item_id_is_one_encoded_segment() {
        let client = TrackingClient::new(AggregateConfig::default()).unwrap();
        assert_eq!(
            client.item_url("a/b?c#d").as_str(),
            "http://localhost:5000/api/tracking/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn test_rejects_unusable_base() {
        let result = TrackingClient::new(AggregateConfig { base_url: "mailto:x@y".to_string(), ..Default::default() });
        assert!(matches!(result, Err(TrackingError::InvalidUrl(_))));
    }
}
