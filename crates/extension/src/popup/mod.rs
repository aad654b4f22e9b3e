//! The popup controller.
//!
//! Exists only while the popup is open. On open it loads the stored token,
//! pulls a fresher one from peers and shows results for the active tab.
//! While open it keeps polling peers, reacts to session changes and to
//! `auth` messages, and follows tab switches. Closing aborts all of it;
//! a refresh still in flight finishes into the cache only.

pub mod view;

pub use view::{CompareState, PopupTab, PopupView, TracksState, ViewState};

use std::sync::Arc;
use std::time::Duration;

use pricewatch_client::{TrackingApi, TrackingError, TrackingRequest};
use pricewatch_core::{AppConfig, ProductRequest, decode_key, derive_key, is_product_page};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::browser::{BrowserHub, ListenerId, RuntimeListener, TabEvent};
use crate::poll::PollPolicy;
use crate::protocol::{SyncMessage, SyncReply};
use crate::session::SessionTokenStore;
use crate::swr::{Orchestrator, ResultView};

/// What the popup is built from.
#[derive(Clone)]
pub struct PopupDeps {
    pub hub: BrowserHub,
    pub session: SessionTokenStore,
    pub orchestrator: Orchestrator,
    pub tracking: Arc<dyn TrackingApi>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Tracked,
    /// Signed out: the login page was opened instead.
    LoginOpened,
    NothingToTrack,
    /// The backend rejected the token; the session was cleared.
    SessionExpired,
    Failed(String),
}

struct PopupInner {
    deps: PopupDeps,
    view: Arc<PopupView>,
    poll: PollPolicy,
    retry_attempts: u32,
    retry_delay: Duration,
}

pub struct Popup {
    inner: Arc<PopupInner>,
    listener: ListenerId,
    tasks: Vec<JoinHandle<()>>,
}

impl Popup {
    /// Open the popup and start its background work.
    pub async fn open(deps: PopupDeps, config: &AppConfig) -> Self {
        let listener = deps.hub.add_listener();
        let listener_id = listener.id;
        let inner = Arc::new(PopupInner {
            deps,
            view: Arc::new(PopupView::new()),
            poll: PollPolicy::popup(config),
            retry_attempts: config.token_retry_attempts,
            retry_delay: config.token_retry_delay(),
        });

        let changes = inner.deps.session.subscribe();
        let tab_events = inner.deps.hub.subscribe();
        let token = inner.deps.session.load().await;
        inner.view.update(|s| s.track_button = token.is_some());
        inner.deps.session.pull_from_peers().await;

        let tasks = vec![
            tokio::spawn(inner.clone().watch_session(changes, token)),
            tokio::spawn(inner.clone().listen(listener)),
            tokio::spawn(inner.clone().poll_peers()),
            tokio::spawn(inner.clone().follow_tabs(tab_events)),
        ];

        inner.show_current_tab().await;
        tracing::debug!("popup opened");

        Self { inner, listener: listener_id, tasks }
    }

    pub fn view(&self) -> &Arc<PopupView> {
        &self.inner.view
    }

    pub fn state(&self) -> ViewState {
        self.inner.view.snapshot()
    }

    /// Re-run the lookup for the active tab.
    pub async fn refresh_current_tab(&self) {
        self.inner.show_current_tab().await;
    }

    /// Look up a product by name.
    pub async fn search(&self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            self.inner.view.set_notice("Enter a product name to search");
            return;
        }
        self.inner.run_lookup(ProductRequest::Query(query.to_string()), query).await;
    }

    /// Track the comparison on screen.
    pub async fn track_current(&self) -> TrackOutcome {
        self.inner.track_current().await
    }

    pub async fn switch_tab(&self, tab: PopupTab) {
        self.inner.view.update(|s| s.tab = tab);
        if tab == PopupTab::Tracks {
            self.inner.deps.session.pull_from_peers().await;
            self.inner.load_tracks().await;
        }
    }

    pub async fn load_tracks(&self) {
        self.inner.load_tracks().await;
    }

    pub async fn delete_track(&self, id: &str) {
        self.inner.delete_track(id).await;
    }

    /// Sign out and wipe cached results.
    pub async fn logout(&self) {
        let session = &self.inner.deps.session;
        session.save(None).await;
        session.save_user(None).await;
        let cleared = self.inner.deps.orchestrator.cache().clear_all().await;
        tracing::info!(cleared, "logged out; cache cleared");
        self.inner.view.update(|s| {
            s.track_button = false;
            s.tracks = TracksState::LoginRequired;
        });
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Popup {
    fn drop(&mut self) {
        self.inner.deps.hub.remove_listener(self.listener);
        self.tasks.iter().for_each(JoinHandle::abort);
        tracing::debug!("popup closed");
    }
}

impl PopupInner {
    fn view_dyn(&self) -> Arc<dyn ResultView> {
        self.view.clone()
    }

    async fn show_current_tab(&self) {
        let Some(tab) = self.deps.hub.active_tab() else {
            self.view.begin("", None, CompareState::Empty);
            return;
        };
        let url = tab.url;
        if url.is_empty() {
            self.view.begin("", None, CompareState::Empty);
            return;
        }

        let request = ProductRequest::Url(url.clone());
        if is_product_page(&url) {
            self.run_lookup(request, &url).await;
            return;
        }

        let key = derive_key(&request);
        let compare = match self.deps.orchestrator.cached(&request).await {
            Some(entry) => CompareState::Results { products: entry.payload.products, from_cache: true },
            None => CompareState::Empty,
        };
        self.view.begin(&url, Some(key), compare);
    }

    async fn run_lookup(&self, request: ProductRequest, subject: &str) {
        let key = derive_key(&request);
        self.view.begin(subject, Some(key.clone()), CompareState::Loading);

        match self.deps.orchestrator.lookup(&request, &self.view_dyn()).await {
            Ok(served) => {
                let compare = CompareState::Results { products: served.products, from_cache: served.from_cache };
                self.view.settle(&served.key, compare);
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "lookup failed");
                self.view.settle(&key, CompareState::Error(format!("Failed to load product prices: {e}")));
            }
        }
        self.refresh_track_button().await;
    }

    async fn refresh_track_button(&self) {
        let signed_in = self.deps.session.load().await.is_some();
        self.view.update(|s| s.track_button = signed_in);
    }

    async fn track_current(&self) -> TrackOutcome {
        let Some(token) = self.deps.session.load().await else {
            let login = format!("{}/auth", self.deps.session.frontend().as_str().trim_end_matches('/'));
            self.deps.hub.open_tab(&login, true);
            return TrackOutcome::LoginOpened;
        };

        let state = self.view.snapshot();
        let original_link = match state.current_key.as_deref().and_then(decode_key) {
            Some(ProductRequest::Url(url)) => url,
            _ => state.subject.clone(),
        };
        let Some(request) = TrackingRequest::from_products(&original_link, state.products(), chrono::Utc::now()) else {
            self.view.set_notice("No product to track");
            return TrackOutcome::NothingToTrack;
        };

        match self.deps.tracking.create(&token, &request).await {
            Ok(()) => {
                self.view.set_notice("Product tracked");
                TrackOutcome::Tracked
            }
            Err(TrackingError::Unauthorized) => {
                self.deps.session.save(None).await;
                TrackOutcome::SessionExpired
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to track product");
                self.view.set_notice(e.to_string());
                TrackOutcome::Failed(e.to_string())
            }
        }
    }

    /// Load the token with a bounded retry, pulling from peers between tries.
    async fn token_with_retry(&self) -> Option<String> {
        let mut token = self.deps.session.load().await;
        let mut attempt = 0;
        while token.is_none() && attempt < self.retry_attempts {
            attempt += 1;
            token = self.deps.session.pull_from_peers().await.map(|found| found.value);
            if token.is_none() && attempt < self.retry_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        token
    }

    async fn load_tracks(&self) {
        let Some(token) = self.token_with_retry().await else {
            self.view.update(|s| s.tracks = TracksState::LoginRequired);
            return;
        };

        self.view.update(|s| s.tracks = TracksState::Loading);
        let tracks = match self.deps.tracking.list(&token).await {
            Ok(list) if list.is_empty() => TracksState::Empty,
            Ok(list) => TracksState::Listed(list),
            Err(TrackingError::Unauthorized) => {
                tracing::info!("stored token rejected; signing out");
                self.deps.session.save(None).await;
                TracksState::LoginRequired
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load tracked products");
                TracksState::Error(e.to_string())
            }
        };
        self.view.update(|s| s.tracks = tracks);
    }

    async fn delete_track(&self, id: &str) {
        if id.is_empty() {
            return;
        }
        let Some(token) = self.deps.session.load().await else {
            self.view.set_notice("Please login to delete tracked products");
            return;
        };
        match self.deps.tracking.delete(&token, id).await {
            Ok(()) => self.load_tracks().await,
            Err(TrackingError::Unauthorized) => {
                self.deps.session.save(None).await;
                self.view.update(|s| s.tracks = TracksState::LoginRequired);
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "failed to delete tracked product");
                self.view.set_notice("Failed to delete tracked product");
            }
        }
    }

    /// React to every session save: the track action always, the tracks
    /// view only when a different token arrives.
    async fn watch_session(self: Arc<Self>, mut changes: watch::Receiver<Option<String>>, mut last: Option<String>) {
        while changes.changed().await.is_ok() {
            let token = changes.borrow_and_update().clone();
            self.view.update(|s| s.track_button = token.is_some());

            let on_tracks = self.view.snapshot().tab == PopupTab::Tracks;
            if token != last && on_tracks {
                match token {
                    Some(_) => self.load_tracks().await,
                    None => self.view.update(|s| s.tracks = TracksState::LoginRequired),
                }
            }
            last = token;
        }
    }

    /// Accept `auth` messages that carry a token.
    async fn listen(self: Arc<Self>, mut listener: RuntimeListener) {
        while let Some(envelope) = listener.inbox.recv().await {
            let reply = match &envelope.message {
                SyncMessage::Auth { token: Some(token), .. } if !token.is_empty() => {
                    self.deps.session.save(Some(token.clone())).await;
                    SyncReply::Ack
                }
                SyncMessage::Auth { .. } | SyncMessage::GetToken | SyncMessage::GetCurrentUrl | SyncMessage::SyncToken => {
                    SyncReply::NotHandled
                }
            };
            envelope.respond(reply);
        }
    }

    async fn poll_peers(self: Arc<Self>) {
        let mut delay = self.poll.interval;
        loop {
            tokio::time::sleep(delay).await;
            let before = self.deps.session.load().await;
            let found = self.deps.session.pull_from_peers().await;
            let changed = found.is_some_and(|f| before.as_deref() != Some(f.value.as_str()));
            self.refresh_track_button().await;
            delay = self.poll.next_delay(delay, changed);
        }
    }

    async fn follow_tabs(self: Arc<Self>, mut events: broadcast::Receiver<TabEvent>) {
        loop {
            match events.recv().await {
                Ok(TabEvent::Activated { .. }) => self.show_current_tab().await,
                Ok(TabEvent::Completed { id, .. }) => {
                    if self.deps.hub.tab(id).is_some_and(|t| t.active) {
                        self.show_current_tab().await;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "popup missed tab events"),
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pricewatch_client::{AggregateError, Normalizer, ProductSource, TrackedProduct};
    use pricewatch_core::{CacheStore, SessionStorage, StorageDb};
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    const PRODUCT_URL: &str = "https://www.flipkart.com/phone/p/itm123";

    struct PriceSource {
        price: Mutex<f64>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProductSource for PriceSource {
        async fn fetch(&self, _request: &ProductRequest) -> Result<Value, AggregateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let price = *self.price.lock().unwrap();
            Ok(json!({
                "success": true,
                "sources": {
                    "flipkart": {"success": true, "data": {"price": price, "title": "Phone"}},
                    "amazon": {"success": true, "data": {"price": price + 100.0, "title": "Phone"}}
                }
            }))
        }
    }

    /// Accepts one token; anything else is unauthorized.
    #[derive(Default)]
    struct MockTracking {
        accepted: Mutex<Option<String>>,
        tracks: Mutex<Vec<TrackedProduct>>,
        created: Mutex<Vec<TrackingRequest>>,
    }

    impl MockTracking {
        fn check(&self, token: &str) -> Result<(), TrackingError> {
            match self.accepted.lock().unwrap().as_deref() {
                Some(accepted) if accepted == token => Ok(()),
                _ => Err(TrackingError::Unauthorized),
            }
        }
    }

    #[async_trait]
    impl TrackingApi for MockTracking {
        async fn create(&self, token: &str, request: &TrackingRequest) -> Result<(), TrackingError> {
            self.check(token)?;
            self.created.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn list(&self, token: &str) -> Result<Vec<TrackedProduct>, TrackingError> {
            self.check(token)?;
            Ok(self.tracks.lock().unwrap().clone())
        }

        async fn delete(&self, token: &str, id: &str) -> Result<(), TrackingError> {
            self.check(token)?;
            self.tracks.lock().unwrap().retain(|t| t.id != id);
            Ok(())
        }
    }

    struct Harness {
        deps: PopupDeps,
        source: Arc<PriceSource>,
        tracking: Arc<MockTracking>,
        config: AppConfig,
    }

    impl Harness {
        async fn new() -> Self {
            let config = AppConfig {
                popup_poll_ms: 30,
                token_retry_attempts: 2,
                token_retry_delay_ms: 10,
                ..Default::default()
            };
            let db = StorageDb::open_in_memory().await.unwrap();
            let hub = BrowserHub::new();
            let session =
                SessionTokenStore::new(SessionStorage::new(db.clone()), hub.clone(), Url::parse(&config.frontend_url).unwrap());
            let source = Arc::new(PriceSource { price: Mutex::new(1000.0), calls: AtomicUsize::new(0) });
            let orchestrator = Orchestrator::new(CacheStore::new(db), source.clone(), Normalizer::default());
            let tracking = Arc::new(MockTracking::default());
            let deps = PopupDeps { hub, session, orchestrator, tracking: tracking.clone() };
            Self { deps, source, tracking, config }
        }

        async fn open(&self) -> Popup {
            Popup::open(self.deps.clone(), &self.config).await
        }

        fn accept(&self, token: &str) {
            *self.tracking.accepted.lock().unwrap() = Some(token.to_string());
        }
    }

    async fn wait_until(popup: &Popup, pred: impl Fn(&ViewState) -> bool) -> ViewState {
        let mut rx = popup.view().subscribe();
        let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| pred(s))).await.unwrap().unwrap();
        state.clone()
    }

    fn first_price(state: &ViewState) -> Option<f64> {
        state.products().first().map(|p| p.price)
    }

    fn track(id: &str) -> TrackedProduct {
        TrackedProduct {
            id: id.to_string(),
            product_name: "Phone".into(),
            lowest_price: 999.0,
            lowest_price_platform: "flipkart".into(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_open_fetches_for_product_tab() {
        let h = Harness::new().await;
        h.deps.hub.open_tab(PRODUCT_URL, true);

        let popup = h.open().await;
        let state = popup.state();
        assert_eq!(state.subject, PRODUCT_URL);
        assert!(matches!(state.compare, CompareState::Results { from_cache: false, .. }));
        assert_eq!(first_price(&state), Some(1000.0));
        assert!(!state.track_button);
    }

    #[tokio::test]
    async fn test_reopen_serves_cache_then_refreshes() {
        let h = Harness::new().await;
        h.deps.hub.open_tab(PRODUCT_URL, true);
        h.open().await.close();

        *h.source.price.lock().unwrap() = 800.0;
        let popup = h.open().await;

        let state = wait_until(&popup, |s| first_price(s) == Some(800.0)).await;
        assert!(matches!(state.compare, CompareState::Results { from_cache: false, .. }));
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsupported_tab_without_cache_is_empty() {
        let h = Harness::new().await;
        h.deps.hub.open_tab("https://news.example.com/article", true);

        let popup = h.open().await;
        assert_eq!(popup.state().compare, CompareState::Empty);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_platform_listing_page_is_not_fetched() {
        let h = Harness::new().await;
        h.deps.hub.open_tab("https://www.flipkart.com/search?q=phone", true);

        let popup = h.open().await;
        assert_eq!(popup.state().compare, CompareState::Empty);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_and_blank_search() {
        let h = Harness::new().await;
        let popup = h.open().await;

        popup.search("   ").await;
        assert!(popup.state().notice.is_some());

        popup.search("pixel 8").await;
        let state = popup.state();
        assert_eq!(state.subject, "pixel 8");
        assert_eq!(state.current_key, Some(derive_key(&ProductRequest::Query("pixel 8".into()))));
        assert_eq!(state.products().len(), 2);
    }

    #[tokio::test]
    async fn test_track_signed_out_opens_login() {
        let h = Harness::new().await;
        h.deps.hub.open_tab(PRODUCT_URL, true);
        let popup = h.open().await;

        assert_eq!(popup.track_current().await, TrackOutcome::LoginOpened);
        assert_eq!(h.deps.hub.active_tab().unwrap().url, "http://localhost:3000/auth");
    }

    #[tokio::test]
    async fn test_track_signed_in() {
        let h = Harness::new().await;
        h.accept("good");
        h.deps.session.save(Some("good".into())).await;
        h.deps.hub.open_tab(PRODUCT_URL, true);
        let popup = h.open().await;
        assert!(popup.state().track_button);

        assert_eq!(popup.track_current().await, TrackOutcome::Tracked);
        let created = h.tracking.created.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].original_link, PRODUCT_URL);
        assert_eq!(created[0].product_name, "Phone");
        assert_eq!(created[0].platforms.len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_to_track() {
        let h = Harness::new().await;
        h.deps.session.save(Some("good".into())).await;
        let popup = h.open().await;

        assert_eq!(popup.track_current().await, TrackOutcome::NothingToTrack);
    }

    #[tokio::test]
    async fn test_rejected_token_signs_out() {
        let h = Harness::new().await;
        h.accept("good");
        h.deps.session.save(Some("stale".into())).await;
        let popup = h.open().await;

        popup.switch_tab(PopupTab::Tracks).await;
        wait_until(&popup, |s| s.tracks == TracksState::LoginRequired && !s.track_button).await;
        assert!(h.deps.session.load().await.is_none());
    }

    #[tokio::test]
    async fn test_tracks_reload_when_token_arrives() {
        let h = Harness::new().await;
        h.accept("good");
        h.tracking.tracks.lock().unwrap().push(track("t1"));
        let popup = h.open().await;

        popup.switch_tab(PopupTab::Tracks).await;
        assert_eq!(popup.state().tracks, TracksState::LoginRequired);

        h.deps.session.save(Some("good".into())).await;
        let state = wait_until(&popup, |s| matches!(s.tracks, TracksState::Listed(_))).await;
        assert_eq!(state.tracks, TracksState::Listed(vec![track("t1")]));
        assert!(state.track_button);
    }

    #[tokio::test]
    async fn test_delete_reloads_tracks() {
        let h = Harness::new().await;
        h.accept("good");
        h.tracking.tracks.lock().unwrap().extend([track("t1"), track("t2")]);
        h.deps.session.save(Some("good".into())).await;
        let popup = h.open().await;

        popup.switch_tab(PopupTab::Tracks).await;
        popup.delete_track("t1").await;
        assert_eq!(popup.state().tracks, TracksState::Listed(vec![track("t2")]));

        popup.delete_track("t2").await;
        assert_eq!(popup.state().tracks, TracksState::Empty);
    }

    #[tokio::test]
    async fn test_auth_message_updates_session() {
        let h = Harness::new().await;
        let popup = h.open().await;

        let reply = h
            .deps
            .hub
            .send_runtime(None, SyncMessage::Auth { token: Some("pushed".into()), user: None })
            .await
            .unwrap();
        assert_eq!(reply, SyncReply::Ack);
        assert_eq!(h.deps.session.load().await.as_deref(), Some("pushed"));
        wait_until(&popup, |s| s.track_button).await;

        let logout = h.deps.hub.send_runtime(None, SyncMessage::Auth { token: None, user: None }).await;
        assert!(logout.is_err());
    }

    #[tokio::test]
    async fn test_frontend_login_reaches_open_popup() {
        let mut h = Harness::new().await;
        // Slow peer polling so only the page's own push can deliver the login.
        h.config.popup_poll_ms = 60_000;
        h.config.background_sync_interval_ms = 0;
        h.accept("fresh");
        h.tracking.tracks.lock().unwrap().push(track("t1"));

        let _background = crate::background::Background::new(h.deps.hub.clone(), h.deps.session.clone(), &h.config).spawn();
        let dashboard = "http://localhost:3000/dashboard";
        let page = Arc::new(crate::page::MemoryPage::new(dashboard));
        let tab = h.deps.hub.open_tab(dashboard, false);
        let agent = crate::content::ContentAgent::new(
            h.deps.hub.clone(),
            tab,
            page.clone(),
            h.deps.session.frontend().clone(),
            PollPolicy::fixed(Duration::from_secs(60)),
        )
        .spawn()
        .unwrap();

        let popup = h.open().await;
        popup.switch_tab(PopupTab::Tracks).await;
        assert_eq!(popup.state().tracks, TracksState::LoginRequired);
        assert!(!popup.state().track_button);

        page.set_local_storage("user", r#"{"name":"Asha"}"#);
        page.set_local_storage("token", "fresh");
        agent.notify_storage_changed();

        let state = wait_until(&popup, |s| matches!(s.tracks, TracksState::Listed(_)) && s.track_button).await;
        assert_eq!(state.tracks, TracksState::Listed(vec![track("t1")]));
        assert_eq!(h.deps.session.load().await.as_deref(), Some("fresh"));
        tokio::time::timeout(Duration::from_secs(2), async {
            while h.deps.session.load_user().await != Some(json!({"name": "Asha"})) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_polling_picks_up_cookie_login() {
        let h = Harness::new().await;
        let popup = h.open().await;
        assert!(!popup.state().track_button);

        h.deps.hub.set_cookie("localhost", "token", "cookie-login");
        wait_until(&popup, |s| s.track_button).await;
        assert_eq!(h.deps.session.load().await.as_deref(), Some("cookie-login"));
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_cache() {
        let h = Harness::new().await;
        h.deps.session.save(Some("good".into())).await;
        h.deps.hub.open_tab(PRODUCT_URL, true);
        let popup = h.open().await;
        assert_eq!(h.deps.orchestrator.cache().stats().await.total, 1);

        popup.logout().await;
        assert!(h.deps.session.load().await.is_none());
        assert_eq!(h.deps.orchestrator.cache().stats().await.total, 0);
        assert!(!popup.state().track_button);
    }

    #[tokio::test]
    async fn test_follows_tab_activation() {
        let h = Harness::new().await;
        let popup = h.open().await;
        assert_eq!(popup.state().compare, CompareState::Empty);

        h.deps.hub.open_tab(PRODUCT_URL, true);
        wait_until(&popup, |s| s.subject == PRODUCT_URL && !s.products().is_empty()).await;
    }

    #[tokio::test]
    async fn test_close_detaches_listener() {
        let h = Harness::new().await;
        let popup = h.open().await;
        popup.close();

        let result = h.deps.hub.send_runtime(None, SyncMessage::SyncToken).await;
        assert!(matches!(result, Err(crate::error::ContextError::NoReceiver(_))));
    }
}
