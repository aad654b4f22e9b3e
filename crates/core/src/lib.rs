//! Core types and shared functionality for pricewatch.
//!
//! This crate provides:
//! - Durable key/value storage with SQLite backend
//! - TTL result cache and its key deriver
//! - Session persistence
//! - The canonical product model
//! - Unified error types and configuration

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod product;
pub mod session;
pub mod storage;

pub use cache::{CacheEntry, CachePayload, CacheStats, CacheStore, KeyNamespace, ProductRequest, decode_key, derive_key};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use product::{Platform, ProductEntry, best_deal, detect_platform, is_product_page};
pub use session::{SessionStorage, token_fingerprint};
pub use storage::StorageDb;
