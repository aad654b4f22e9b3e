//! The host page as seen by a content agent.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

const TOKEN_COOKIES: &[&str] = &["token", "authToken"];

/// Session indicators exposed by a web page.
pub trait HostPage: Send + Sync {
    fn url(&self) -> String;

    /// An item from the page's local storage.
    fn local_storage_item(&self, key: &str) -> Option<String>;

    /// The page's `document.cookie` string.
    fn cookie_header(&self) -> String;

    /// The initial-state payload embedded by the page framework.
    fn initial_state(&self) -> Option<Value>;
}

/// A token/user pair read from a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSession {
    pub token: Option<String>,
    pub user: Option<Value>,
}

impl PageSession {
    /// Read the page's session.
    ///
    /// Local storage first, then the `token`/`authToken` cookies, then the
    /// embedded initial state. The user comes from local storage only.
    pub fn read(page: &dyn HostPage) -> Self {
        let user = page.local_storage_item("user").and_then(|raw| match serde_json::from_str::<Value>(&raw) {
            Ok(user) => Some(user).filter(|u| !u.is_null()),
            Err(e) => {
                tracing::debug!(error = %e, "unparsable user in local storage");
                None
            }
        });

        let token = page
            .local_storage_item("token")
            .filter(|t| !t.is_empty())
            .or_else(|| cookie_token(&page.cookie_header()))
            .or_else(|| {
                page.initial_state()
                    .and_then(|state| state.pointer("/props/pageProps/token").and_then(Value::as_str).map(str::to_string))
                    .filter(|t| !t.is_empty())
            });

        Self { token, user }
    }
}

/// Token from a cookie header. The last matching cookie wins.
fn cookie_token(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .filter_map(|cookie| cookie.split_once('='))
        .filter(|(name, value)| TOKEN_COOKIES.contains(name) && !value.is_empty())
        .map(|(_, value)| value.to_string())
        .last()
}

/// The raw `token=` cookie, used to notice cookie-only changes.
pub(crate) fn raw_token_cookie(page: &dyn HostPage) -> Option<String> {
    page.cookie_header()
        .split(';')
        .map(str::trim)
        .find(|c| c.starts_with("token="))
        .map(str::to_string)
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    local_storage: HashMap<String, String>,
    cookies: Vec<(String, String)>,
    initial_state: Option<Value>,
}

/// An in-memory page whose indicators can be changed while an agent runs.
#[derive(Debug, Default)]
pub struct MemoryPage {
    state: Mutex<PageState>,
}

impl MemoryPage {
    pub fn new(url: &str) -> Self {
        Self { state: Mutex::new(PageState { url: url.to_string(), ..Default::default() }) }
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_local_storage(&self, key: &str, value: &str) {
        self.lock().local_storage.insert(key.to_string(), value.to_string());
    }

    pub fn remove_local_storage(&self, key: &str) {
        self.lock().local_storage.remove(key);
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        let mut state = self.lock();
        state.cookies.retain(|(n, _)| n != name);
        state.cookies.push((name.to_string(), value.to_string()));
    }

    pub fn remove_cookie(&self, name: &str) {
        self.lock().cookies.retain(|(n, _)| n != name);
    }

    pub fn set_initial_state(&self, state: Option<Value>) {
        self.lock().initial_state = state;
    }

    pub fn set_url(&self, url: &str) {
        self.lock().url = url.to_string();
    }
}

impl HostPage for MemoryPage {
    fn url(&self) -> String {
        self.lock().url.clone()
    }

    fn local_storage_item(&self, key: &str) -> Option<String> {
        self.lock().local_storage.get(key).cloned()
    }

    fn cookie_header(&self) -> String {
        self.lock()
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn initial_state(&self) -> Option<Value> {
        self.lock().initial_state.clone()
    }
}
