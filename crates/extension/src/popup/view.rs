//! Popup display state.

use pricewatch_client::TrackedProduct;
use pricewatch_core::ProductEntry;
use tokio::sync::watch;

use crate::swr::ResultView;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PopupTab {
    #[default]
    Compare,
    Tracks,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CompareState {
    #[default]
    Empty,
    Loading,
    Results { products: Vec<ProductEntry>, from_cache: bool },
    Error(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum TracksState {
    #[default]
    NotLoaded,
    LoginRequired,
    Loading,
    Empty,
    Listed(Vec<TrackedProduct>),
    Error(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub tab: PopupTab,
    /// Current tab URL or search query.
    pub subject: String,
    /// Cache key of the request on screen.
    pub current_key: Option<String>,
    pub compare: CompareState,
    /// Whether the "track" action is offered (signed in).
    pub track_button: bool,
    pub tracks: TracksState,
    /// Transient message (errors, confirmations).
    pub notice: Option<String>,
}

impl ViewState {
    pub fn products(&self) -> &[ProductEntry] {
        match &self.compare {
            CompareState::Results { products, .. } => products,
            _ => &[],
        }
    }
}

/// The popup's view. Updates are published to subscribers.
#[derive(Debug)]
pub struct PopupView {
    state: watch::Sender<ViewState>,
}

impl Default for PopupView {
    fn default() -> Self {
        Self::new()
    }
}

impl PopupView {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ViewState::default());
        Self { state }
    }

    pub fn snapshot(&self) -> ViewState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut ViewState)) {
        self.state.send_modify(f);
    }

    /// Point the view at a new request, showing `compare` until results arrive.
    pub(crate) fn begin(&self, subject: &str, key: Option<String>, compare: CompareState) {
        self.update(|s| {
            s.subject = subject.to_string();
            s.current_key = key;
            s.compare = compare;
        });
    }

    /// Set `compare` only if the view still shows `key`.
    pub(crate) fn settle(&self, key: &str, compare: CompareState) {
        self.update(|s| {
            if s.current_key.as_deref() == Some(key) {
                s.compare = compare;
            }
        });
    }

    pub(crate) fn set_notice(&self, notice: impl Into<String>) {
        let notice = notice.into();
        self.update(|s| s.notice = Some(notice));
    }
}

impl ResultView for PopupView {
    fn current_key(&self) -> Option<String> {
        self.state.borrow().current_key.clone()
    }

    fn show_results(&self, key: &str, products: &[ProductEntry], from_cache: bool) {
        self.settle(key, CompareState::Results { products: products.to_vec(), from_cache });
    }
}
