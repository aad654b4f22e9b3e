//! TTL cache store.
//!
//! Expiry is decided here and nowhere else: `get` evicts an expired entry
//! the first time it sees one, `stats` only counts. Storage failures on
//! the read path are logged and reported as a miss so callers re-fetch
//! instead of serving something they could not decode.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::entry::{CacheEntry, CachePayload, CacheStats};
use super::key::KeyNamespace;
use crate::Error;
use crate::clock::{Clock, SystemClock};
use crate::storage::StorageDb;

/// Maximum age of a cache entry.
pub const CACHE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Only the timestamp is read during a stats scan.
#[derive(Deserialize)]
struct Stamp {
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    // A negative age (clock moved backwards) fails `to_std` and counts as fresh.
    (now - created_at).to_std().is_ok_and(|age| age >= CACHE_TTL)
}

/// Key → entry store with lazy TTL eviction.
#[derive(Clone)]
pub struct CacheStore {
    db: StorageDb,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").field("db", &self.db).finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(db: StorageDb) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: StorageDb, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Look up a live entry.
    ///
    /// Returns None when the key is absent, unreadable, or expired. An
    /// expired entry is deleted as a side effect.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let json = match self.db.get_value(key).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        let entry = match serde_json::from_str::<CacheEntry>(&json) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "corrupt cache entry, treating as miss");
                return None;
            }
        };

        let now = self.clock.now();
        if is_expired(entry.created_at, now) {
            tracing::debug!(key, "cache entry expired, evicting");
            // Only the record that was judged stale is deleted; a concurrent set survives.
            match self.db.remove_if(key, &json).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!(key, "expired entry replaced before eviction"),
                Err(e) => tracing::warn!(key, error = %e, "failed to evict expired cache entry"),
            }
            return None;
        }

        tracing::debug!(key, age_minutes = entry.age(now).num_minutes(), "cache hit");
        Some(entry)
    }

    /// Write `payload` under `key`, stamped with the current time.
    ///
    /// Unconditionally replaces any prior entry.
    pub async fn set(&self, key: &str, payload: CachePayload) -> Result<(), Error> {
        let entry = CacheEntry { key: key.to_string(), payload, created_at: self.clock.now() };
        self.db.put_json(key, &entry).await
    }

    /// Classify every cache record by TTL without evicting anything.
    pub async fn stats(&self) -> CacheStats {
        let rows = match self.db.scan_prefixes(&namespace_prefixes()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "cache stats scan failed");
                return CacheStats::default();
            }
        };

        let now = self.clock.now();
        let mut stats = CacheStats { total: rows.len(), ..Default::default() };
        for (_, json) in rows {
            if let Ok(stamp) = serde_json::from_str::<Stamp>(&json) {
                if is_expired(stamp.created_at, now) {
                    stats.expired += 1;
                } else {
                    stats.valid += 1;
                }
            }
        }
        stats
    }

    /// Remove every cache key accepted by `filter`.
    ///
    /// Only keys inside the cache namespaces are offered to the filter, so
    /// session keys can never be cleared through here. Returns the number
    /// of removed entries; storage failures are logged and count as zero.
    pub async fn clear<F>(&self, filter: F) -> u64
    where
        F: Fn(&str) -> bool,
    {
        let keys: Vec<String> = match self.db.scan_prefixes(&namespace_prefixes()).await {
            Ok(rows) => rows
                .into_iter()
                .map(|(key, _)| key)
                .filter(|key| filter(key))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "cache clear scan failed");
                return 0;
            }
        };

        match self.db.remove(&keys).await {
            Ok(removed) => {
                tracing::info!(removed, "cleared cached results");
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "cache clear failed");
                0
            }
        }
    }

    /// Remove every product and search entry.
    pub async fn clear_all(&self) -> u64 {
        self.clear(|_| true).await
    }

    /// Remove every entry in one namespace.
    pub async fn clear_namespace(&self, namespace: KeyNamespace) -> u64 {
        self.clear(|key| KeyNamespace::of(key) == Some(namespace)).await
    }
}

fn namespace_prefixes() -> [&'static str; 2] {
    KeyNamespace::ALL.map(KeyNamespace::prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::{ProductRequest, derive_key};
    use crate::clock::ManualClock;
    use crate::product::{Platform, ProductEntry};
    use chrono::Duration as ChronoDuration;

    fn payload(price: f64) -> CachePayload {
        CachePayload {
            products: vec![ProductEntry {
                platform: Platform::Amazon,
                title: "Phone".to_string(),
                price,
                mrp: None,
                discount: None,
                image: "/img.png".to_string(),
                link: "#".to_string(),
                rating: None,
            }],
            raw_data: serde_json::json!({"success": true}),
        }
    }

    async fn store_with_clock() -> (CacheStore, Arc<ManualClock>) {
        let db = StorageDb::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (CacheStore::with_clock(db, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (store, _) = store_with_clock().await;
        assert!(store.get("product_nothing").await.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (store, _) = store_with_clock().await;
        store.set("product_a", payload(10.0)).await.unwrap();

        let entry = store.get("product_a").await.unwrap();
        assert_eq!(entry.key, "product_a");
        assert_eq!(entry.payload, payload(10.0));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let (store, _) = store_with_clock().await;
        store.set("product_a", payload(10.0)).await.unwrap();
        store.set("product_a", payload(20.0)).await.unwrap();

        let entry = store.get("product_a").await.unwrap();
        assert_eq!(entry.payload.products[0].price, 20.0);
    }

    #[tokio::test]
    async fn test_ttl_hit_then_lazy_eviction() {
        let (store, clock) = store_with_clock().await;
        let key = derive_key(&ProductRequest::Url("https://www.amazon.in/x/dp/B01".to_string()));
        store.set(&key, payload(999.0)).await.unwrap();

        clock.advance(ChronoDuration::hours(1));
        assert!(store.get(&key).await.is_some());

        clock.advance(ChronoDuration::hours(2));
        let before = store.stats().await;
        assert_eq!(before, CacheStats { total: 1, valid: 0, expired: 1 });

        assert!(store.get(&key).await.is_none());
        assert_eq!(store.stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_inclusive() {
        let (store, clock) = store_with_clock().await;
        store.set("search_a", payload(1.0)).await.unwrap();

        clock.advance(ChronoDuration::hours(2) - ChronoDuration::seconds(1));
        assert!(store.get("search_a").await.is_some());

        clock.advance(ChronoDuration::seconds(1));
        assert!(store.get("search_a").await.is_none());
    }

    /// Clock that lands a fresh `set` on the store the first time it is read.
    struct WritingClock {
        store: std::sync::OnceLock<CacheStore>,
        fired: std::sync::atomic::AtomicBool,
        now: DateTime<Utc>,
    }

    impl Clock for WritingClock {
        fn now(&self) -> DateTime<Utc> {
            if !self.fired.swap(true, std::sync::atomic::Ordering::SeqCst)
                && let Some(store) = self.store.get()
            {
                let handle = tokio::runtime::Handle::current();
                tokio::task::block_in_place(|| handle.block_on(store.set("product_k", payload(5.0)))).unwrap();
            }
            self.now
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_eviction_keeps_concurrent_write() {
        let db = StorageDb::open_in_memory().await.unwrap();
        let stale = CacheEntry {
            key: "product_k".to_string(),
            payload: payload(1.0),
            created_at: Utc::now() - ChronoDuration::hours(3),
        };
        db.put_json("product_k", &stale).await.unwrap();

        let clock = Arc::new(WritingClock {
            store: std::sync::OnceLock::new(),
            fired: std::sync::atomic::AtomicBool::new(false),
            now: Utc::now(),
        });
        let store = CacheStore::with_clock(db.clone(), clock.clone());
        let writer = CacheStore::with_clock(db, Arc::new(ManualClock::new(Utc::now())));
        clock.store.set(writer).unwrap();

        let evicting = store.clone();
        let first = tokio::spawn(async move { evicting.get("product_k").await }).await.unwrap();
        assert!(first.is_none());

        let fresh = store.get("product_k").await.unwrap();
        assert_eq!(fresh.payload.products[0].price, 5.0);
    }

    #[tokio::test]
    async fn test_stats_does_not_evict() {
        let (store, clock) = store_with_clock().await;
        store.set("product_old", payload(1.0)).await.unwrap();
        clock.advance(ChronoDuration::hours(3));
        store.set("search_new", payload(2.0)).await.unwrap();

        let first = store.stats().await;
        let second = store.stats().await;
        assert_eq!(first, CacheStats { total: 2, valid: 1, expired: 1 });
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stats_ignores_session_keys() {
        let (store, _) = store_with_clock().await;
        store.db.put_json("token", "abc").await.unwrap();
        store.set("product_a", payload(1.0)).await.unwrap();

        assert_eq!(store.stats().await.total, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (store, _) = store_with_clock().await;
        store.db.put_value("product_bad", "{\"payload\":").await.unwrap();

        assert!(store.get("product_bad").await.is_none());
        assert_eq!(store.stats().await, CacheStats { total: 1, valid: 0, expired: 0 });
    }

    #[tokio::test]
    async fn test_clear_by_namespace() {
        let (store, _) = store_with_clock().await;
        store.set("product_a", payload(1.0)).await.unwrap();
        store.set("search_b", payload(2.0)).await.unwrap();
        store.db.put_json("token", "abc").await.unwrap();

        assert_eq!(store.clear_namespace(KeyNamespace::Search).await, 1);
        assert!(store.get("product_a").await.is_some());
        assert!(store.get("search_b").await.is_none());

        assert_eq!(store.clear_all().await, 1);
        assert_eq!(store.stats().await.total, 0);
        assert!(store.db.get_value("token").await.unwrap().is_some());
    }
}
