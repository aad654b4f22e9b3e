//! Tracking client error types.

use std::sync::Arc;

/// Errors from the tracking endpoints.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackingError {
    /// The bearer token was rejected (401).
    #[error("UNAUTHORIZED: session token rejected")]
    Unauthorized,

    /// Any other error status. `message` is the server's `error` field when present.
    #[error("HTTP_ERROR: {status}{}", message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    HttpError { status: u16, message: Option<String> },

    /// The configured base URL cannot carry endpoint paths.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Request timeout.
    #[error("TIMEOUT: tracking request timed out")]
    Timeout,

    /// Network error.
    #[error("NETWORK_ERROR: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response body did not match any known shape.
    #[error("PARSE_ERROR: {0}")]
    Parse(String),
}

impl TrackingError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TrackingError::Unauthorized)
    }
}

impl From<reqwest::Error> for TrackingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { TrackingError::Timeout } else { TrackingError::Network(Arc::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert!(TrackingError::Unauthorized.to_string().starts_with("UNAUTHORIZED"));

        let err = TrackingError::HttpError { status: 409, message: Some("already tracked".to_string()) };
        assert_eq!(err.to_string(), "HTTP_ERROR: 409 (already tracked)");

        let err = TrackingError::HttpError { status: 500, message: None };
        assert_eq!(err.to_string(), "HTTP_ERROR: 500");
    }

    #[test]
    fn test_is_unauthorized() {
        assert!(TrackingError::Unauthorized.is_unauthorized());
        assert!(!TrackingError::Timeout.is_unauthorized());
    }
}
