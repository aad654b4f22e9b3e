//! Cache key derivation.
//!
//! A key is a namespace tag followed by the URL-safe base64 encoding of the
//! request value: `product_<encoded-url>` or `search_<encoded-query>`. The
//! encoding is reversible, so distinct values never share a key and the two
//! namespaces never collide.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// A cacheable lookup: either a product page URL or a free-text query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ProductRequest {
    Url(String),
    Query(String),
}

impl ProductRequest {
    pub fn value(&self) -> &str {
        match self {
            Self::Url(v) | Self::Query(v) => v,
        }
    }

    pub fn namespace(&self) -> KeyNamespace {
        match self {
            Self::Url(_) => KeyNamespace::Product,
            Self::Query(_) => KeyNamespace::Search,
        }
    }
}

/// Storage namespaces owned by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyNamespace {
    Product,
    Search,
}

impl KeyNamespace {
    pub const ALL: [KeyNamespace; 2] = [KeyNamespace::Product, KeyNamespace::Search];

    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Product => "product_",
            Self::Search => "search_",
        }
    }

    /// The namespace a derived key belongs to, if any.
    pub fn of(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| key.starts_with(ns.prefix()))
    }
}

/// True when `value` already carries one of the cache namespace prefixes.
pub fn is_derived_key(value: &str) -> bool {
    KeyNamespace::of(value).is_some()
}

/// Derive the cache key for a request.
///
/// Pure and deterministic. A value that is already a derived key is
/// returned unchanged, so call sites may pass either a raw request or a
/// precomputed key.
pub fn derive_key(request: &ProductRequest) -> String {
    let value = request.value();
    if is_derived_key(value) {
        return value.to_string();
    }
    format!("{}{}", request.namespace().prefix(), URL_SAFE_NO_PAD.encode(value.as_bytes()))
}

/// Recover the request a key was derived from.
///
/// Returns None for keys outside the cache namespaces or with a payload
/// that is not valid encoded UTF-8.
pub fn decode_key(key: &str) -> Option<ProductRequest> {
    let namespace = KeyNamespace::of(key)?;
    let encoded = &key[namespace.prefix().len()..];
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    let value = String::from_utf8(bytes).ok()?;
    Some(match namespace {
        KeyNamespace::Product => ProductRequest::Url(value),
        KeyNamespace::Search => ProductRequest::Query(value),
    })
}
