//! Stale-while-revalidate lookups.
//!
//! A cache hit is served at once and refreshed in the background; the
//! refresh updates the cache and, if the view is still showing the same
//! request, the displayed results. A miss blocks on the fetch and fails
//! loudly since there is nothing to fall back to.
//!
//! Concurrent fetches for one key share a single spawned task. The task
//! writes the cache even if every caller has gone away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use pricewatch_client::{AggregateError, Normalizer, ProductSource};
use pricewatch_core::{CacheEntry, CachePayload, CacheStore, ProductEntry, ProductRequest, decode_key, derive_key};
use tokio::task::JoinHandle;

type InflightFetch = Shared<BoxFuture<'static, Result<CachePayload, AggregateError>>>;

/// Where results are displayed.
pub trait ResultView: Send + Sync {
    /// Key of the request currently on screen.
    fn current_key(&self) -> Option<String>;

    fn show_results(&self, key: &str, products: &[ProductEntry], from_cache: bool);
}

/// Result of a lookup.
#[derive(Debug)]
pub struct Served {
    pub key: String,
    pub products: Vec<ProductEntry>,
    pub from_cache: bool,
    /// Background refresh started for a cache hit.
    pub refresh: Option<JoinHandle<RefreshOutcome>>,
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// Cache updated and the view now shows the fresh results.
    Displayed,
    /// Cache updated; the view had moved on to another request.
    Superseded,
    /// Cache updated; the view no longer exists.
    ViewClosed,
    /// Fetch failed; cache and view unchanged.
    Failed(AggregateError),
}

#[derive(Clone)]
pub struct Orchestrator {
    cache: CacheStore,
    source: Arc<dyn ProductSource>,
    normalizer: Normalizer,
    inflight: Arc<Mutex<HashMap<String, InflightFetch>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cache", &self.cache)
            .field("normalizer", &self.normalizer)
            .field("inflight", &self.lock_inflight().len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(cache: CacheStore, source: Arc<dyn ProductSource>, normalizer: Normalizer) -> Self {
        Self { cache, source, normalizer, inflight: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<String, InflightFetch>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `request` from cache if possible, otherwise fetch it.
    ///
    /// On a hit the returned [`Served::refresh`] is already running; it
    /// holds the view weakly and only touches it if
    /// [`ResultView::current_key`] still matches.
    ///
    /// # Errors
    ///
    /// Returns the fetch error on a miss.
    pub async fn lookup(&self, request: &ProductRequest, view: &Arc<dyn ResultView>) -> Result<Served, AggregateError> {
        let key = derive_key(request);
        let request = decode_key(&key).unwrap_or_else(|| request.clone());

        if let Some(entry) = self.cache.get(&key).await {
            tracing::debug!(key, "serving cached results and refreshing");
            let refresh = self.spawn_refresh(key.clone(), &request, Arc::downgrade(view));
            return Ok(Served { key, products: entry.payload.products, from_cache: true, refresh: Some(refresh) });
        }

        tracing::debug!(key, "cache miss");
        let payload = self.fetch_shared(&key, &request).await?;
        Ok(Served { key, products: payload.products, from_cache: false, refresh: None })
    }

    /// Peek at the cache without fetching or refreshing.
    pub async fn cached(&self, request: &ProductRequest) -> Option<CacheEntry> {
        self.cache.get(&derive_key(request)).await
    }

    fn spawn_refresh(&self, key: String, request: &ProductRequest, view: Weak<dyn ResultView>) -> JoinHandle<RefreshOutcome> {
        let fetch = self.fetch_shared(&key, request);
        tokio::spawn(async move {
            let payload = match fetch.await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(key, error = %e, "background refresh failed; keeping cached result");
                    return RefreshOutcome::Failed(e);
                }
            };
            let Some(view) = view.upgrade() else {
                tracing::debug!(key, "refreshed after view closed");
                return RefreshOutcome::ViewClosed;
            };
            if view.current_key().as_deref() != Some(key.as_str()) {
                tracing::debug!(key, "refreshed after view moved on");
                return RefreshOutcome::Superseded;
            }
            view.show_results(&key, &payload.products, false);
            RefreshOutcome::Displayed
        })
    }

    /// Join the in-flight fetch for `key` or start one.
    fn fetch_shared(&self, key: &str, request: &ProductRequest) -> InflightFetch {
        let mut inflight = self.lock_inflight();
        if let Some(existing) = inflight.get(key) {
            tracing::debug!(key, "joining in-flight fetch");
            return existing.clone();
        }

        let this = self.clone();
        let owned_key = key.to_string();
        let request = request.clone();
        let task = tokio::spawn(async move {
            let result = this.fetch_and_store(&owned_key, &request).await;
            this.lock_inflight().remove(&owned_key);
            result
        });

        let fetch = task
            .map(|joined| joined.unwrap_or_else(|e| Err(AggregateError::Aborted(e.to_string()))))
            .boxed()
            .shared();
        inflight.insert(key.to_string(), fetch.clone());
        fetch
    }

    async fn fetch_and_store(&self, key: &str, request: &ProductRequest) -> Result<CachePayload, AggregateError> {
        let raw = self.source.fetch(request).await?;
        let products = self.normalizer.normalize(&raw);
        tracing::debug!(key, count = products.len(), "fetched products");

        let payload = CachePayload { products, raw_data: raw };
        if let Err(e) = self.cache.set(key, payload.clone()).await {
            tracing::warn!(key, error = %e, "failed to cache results");
        }
        Ok(payload)
    }
}
