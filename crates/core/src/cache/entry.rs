//! Cached payloads and their storage envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::product::ProductEntry;

/// What a successful fetch produces: the normalized products plus the
/// upstream envelope they were derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePayload {
    pub products: Vec<ProductEntry>,
    #[serde(default)]
    pub raw_data: serde_json::Value,
}

/// A stored cache record. Immutable once written; refreshed wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub payload: CachePayload,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Counts produced by a read-only scan of the cache namespaces.
///
/// `total` counts every key in the namespaces, including records whose
/// timestamp could not be read; those are neither valid nor expired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
}
