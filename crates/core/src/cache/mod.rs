//! Short-lived result cache on top of durable storage.
//!
//! - Deterministic, reversible cache keys per request kind
//! - Fixed two-hour TTL with lazy eviction on read
//! - Read-only diagnostics (`stats`) and bulk namespace clears

pub mod entry;
pub mod key;
pub mod store;

pub use entry::{CacheEntry, CachePayload, CacheStats};
pub use key::{KeyNamespace, ProductRequest, decode_key, derive_key, is_derived_key};
pub use store::{CACHE_TTL, CacheStore};
