//! Aggregation request body.

use pricewatch_core::ProductRequest;
use serde::Serialize;

use super::AggregateError;

/// Body of `POST /aggregate-scrape`: `{link}` or `{productName}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AggregateRequest {
    Link {
        link: String,
    },
    ProductName {
        #[serde(rename = "productName")]
        product_name: String,
    },
}

impl AggregateRequest {
    /// Build the body for a lookup.
    ///
    /// Returns an error for a blank URL or query.
    pub fn for_lookup(request: &ProductRequest) -> Result<Self, AggregateError> {
        let value = request.value().trim();
        if value.is_empty() {
            return Err(AggregateError::InvalidRequest("nothing to look up".to_string()));
        }
        Ok(match request {
            ProductRequest::Url(_) => Self::Link { link: value.to_string() },
            ProductRequest::Query(_) => Self::ProductName { product_name: value.to_string() },
        })
    }
}
