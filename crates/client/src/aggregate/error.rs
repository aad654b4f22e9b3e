//! Aggregation client error types.

use std::sync::Arc;

/// Errors from the aggregation endpoint.
///
/// `Clone` so one failed fetch can be handed to every caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AggregateError {
    /// The request carried nothing to look up.
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    /// Request timeout.
    #[error("TIMEOUT: aggregation request timed out")]
    Timeout,

    /// Network error.
    #[error("NETWORK_ERROR: {0}")]
    Network(Arc<reqwest::Error>),

    /// HTTP error response.
    #[error("HTTP_ERROR: {status}")]
    HttpError { status: u16 },

    /// Response body was not JSON.
    #[error("PARSE_ERROR: {0}")]
    Parse(String),

    /// The task running the fetch ended without producing a result.
    #[error("ABORTED: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for AggregateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { AggregateError::Timeout } else { AggregateError::Network(Arc::new(err)) }
    }
}
