//! In-process browser runtime.
//!
//! [`BrowserHub`] models the parts of the browser the contexts talk
//! through: the tab list and its events, per-tab content agents, the
//! runtime channel that reaches the background and popup listeners, and
//! the cookie jar. Each context holds a clone; all clones share state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{broadcast, mpsc};
use url::{Origin, Url};

use crate::error::ContextError;
use crate::protocol::{Envelope, SyncMessage, SyncReply};

pub type TabId = u32;

/// How long a sender waits for any single context to answer.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const MAILBOX_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
    pub active: bool,
    /// The page finished loading.
    pub complete: bool,
}

impl TabInfo {
    pub fn origin(&self) -> Option<Origin> {
        Url::parse(&self.url).ok().map(|u| u.origin())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    Opened { id: TabId, url: String },
    /// Navigation started; the old page and its agent are gone.
    Navigated { id: TabId, url: String },
    Completed { id: TabId, url: String },
    Activated { id: TabId },
    Removed { id: TabId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A context registered on the runtime channel.
#[derive(Debug)]
pub struct RuntimeListener {
    pub id: ListenerId,
    pub inbox: mpsc::Receiver<Envelope>,
}

#[derive(Default)]
struct HubState {
    next_tab: TabId,
    next_listener: u64,
    tabs: BTreeMap<TabId, TabInfo>,
    agents: HashMap<TabId, mpsc::Sender<Envelope>>,
    listeners: Vec<(ListenerId, mpsc::Sender<Envelope>)>,
    cookies: BTreeMap<String, BTreeMap<String, String>>,
    cookies_denied: bool,
}

/// Shared handle to the browser runtime.
#[derive(Clone)]
pub struct BrowserHub {
    state: Arc<Mutex<HubState>>,
    events: broadcast::Sender<TabEvent>,
}

impl std::fmt::Debug for BrowserHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BrowserHub")
            .field("tabs", &state.tabs.len())
            .field("agents", &state.agents.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl Default for BrowserHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { state: Arc::new(Mutex::new(HubState { next_tab: 1, ..Default::default() })), events }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TabEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }

    /// Open a tab that starts loading `url`.
    pub fn open_tab(&self, url: &str, active: bool) -> TabId {
        let id = {
            let mut state = self.lock();
            let id = state.next_tab;
            state.next_tab += 1;
            if active {
                state.tabs.values_mut().for_each(|t| t.active = false);
            }
            state.tabs.insert(id, TabInfo { id, url: url.to_string(), active, complete: false });
            id
        };
        tracing::debug!(tab = id, url, "tab opened");
        self.emit(TabEvent::Opened { id, url: url.to_string() });
        if active {
            self.emit(TabEvent::Activated { id });
        }
        id
    }

    /// Navigate a tab. Its content agent is detached.
    pub fn navigate(&self, id: TabId, url: &str) -> bool {
        {
            let mut state = self.lock();
            let Some(tab) = state.tabs.get_mut(&id) else { return false };
            tab.url = url.to_string();
            tab.complete = false;
            state.agents.remove(&id);
        }
        self.emit(TabEvent::Navigated { id, url: url.to_string() });
        true
    }

    /// Mark a tab's page as fully loaded.
    pub fn complete(&self, id: TabId) -> bool {
        let url = {
            let mut state = self.lock();
            let Some(tab) = state.tabs.get_mut(&id) else { return false };
            tab.complete = true;
            tab.url.clone()
        };
        self.emit(TabEvent::Completed { id, url });
        true
    }

    pub fn activate(&self, id: TabId) -> bool {
        {
            let mut state = self.lock();
            if !state.tabs.contains_key(&id) {
                return false;
            }
            state.tabs.values_mut().for_each(|t| t.active = t.id == id);
        }
        self.emit(TabEvent::Activated { id });
        true
    }

    pub fn remove_tab(&self, id: TabId) -> bool {
        let removed = {
            let mut state = self.lock();
            state.agents.remove(&id);
            state.tabs.remove(&id).is_some()
        };
        if removed {
            self.emit(TabEvent::Removed { id });
        }
        removed
    }

    pub fn tab(&self, id: TabId) -> Option<TabInfo> {
        self.lock().tabs.get(&id).cloned()
    }

    pub fn active_tab(&self) -> Option<TabInfo> {
        self.lock().tabs.values().find(|t| t.active).cloned()
    }

    /// Tabs whose page is on `origin`.
    pub fn query_tabs(&self, origin: &Origin) -> Vec<TabInfo> {
        self.lock()
            .tabs
            .values()
            .filter(|t| t.origin().as_ref() == Some(origin))
            .cloned()
            .collect()
    }

    /// Attach a content agent to a tab, replacing any previous one.
    pub(crate) fn attach_agent(&self, id: TabId) -> Option<mpsc::Receiver<Envelope>> {
        let mut state = self.lock();
        if !state.tabs.contains_key(&id) {
            return None;
        }
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        state.agents.insert(id, tx);
        Some(rx)
    }

    /// Send a message to the content agent in a tab and await its reply.
    pub async fn send_to_tab(&self, id: TabId, message: SyncMessage) -> Result<SyncReply, ContextError> {
        let target = format!("tab {id}");
        let agent = self.lock().agents.get(&id).cloned().ok_or_else(|| ContextError::NoReceiver(target.clone()))?;

        let (envelope, reply) = Envelope::new(message);
        agent.send_timeout(envelope, REPLY_TIMEOUT).await.map_err(|e| match e {
            SendTimeoutError::Timeout(_) => ContextError::Unanswered(target.clone()),
            SendTimeoutError::Closed(_) => ContextError::Closed(target.clone()),
        })?;

        match tokio::time::timeout(REPLY_TIMEOUT, reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ContextError::Closed(target)),
            Err(_) => Err(ContextError::Unanswered(target)),
        }
    }

    pub fn add_listener(&self) -> RuntimeListener {
        let mut state = self.lock();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        let (tx, inbox) = mpsc::channel(MAILBOX_CAPACITY);
        state.listeners.push((id, tx));
        RuntimeListener { id, inbox }
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.lock().listeners.retain(|(l, _)| *l != id);
    }

    /// Deliver a message to every runtime listener except `from`.
    ///
    /// The first reply that is not `NotHandled` wins; later replies are
    /// dropped.
    pub async fn send_runtime(&self, from: Option<ListenerId>, message: SyncMessage) -> Result<SyncReply, ContextError> {
        let action = message.action();
        let targets: Vec<_> = {
            let mut state = self.lock();
            state.listeners.retain(|(_, tx)| !tx.is_closed());
            state
                .listeners
                .iter()
                .filter(|(id, _)| Some(*id) != from)
                .map(|(_, tx)| tx.clone())
                .collect()
        };
        if targets.is_empty() {
            return Err(ContextError::NoReceiver("runtime".to_string()));
        }

        let mut pending: FuturesUnordered<_> = targets
            .into_iter()
            .map(|target| {
                let (envelope, reply) = Envelope::new(message.clone());
                async move {
                    // A listener whose mailbox stays full counts as no answer.
                    target.send_timeout(envelope, REPLY_TIMEOUT).await.ok()?;
                    tokio::time::timeout(REPLY_TIMEOUT, reply).await.ok()?.ok()
                }
            })
            .collect();

        while let Some(answer) = pending.next().await {
            if let Some(reply) = answer
                && reply.is_handled()
            {
                return Ok(reply);
            }
        }
        Err(ContextError::Unanswered(action.to_string()))
    }

    pub fn set_cookie(&self, host: &str, name: &str, value: &str) {
        self.lock()
            .cookies
            .entry(host.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove_cookie(&self, host: &str, name: &str) {
        if let Some(jar) = self.lock().cookies.get_mut(host) {
            jar.remove(name);
        }
    }

    /// Simulate the extension lacking cookie permission.
    pub fn deny_cookies(&self, denied: bool) {
        self.lock().cookies_denied = denied;
    }

    pub fn cookies(&self, host: &str) -> Result<Vec<Cookie>, ContextError> {
        let state = self.lock();
        if state.cookies_denied {
            return Err(ContextError::Denied(format!("cookies for {host}")));
        }
        Ok(state
            .cookies
            .get(host)
            .map(|jar| jar.iter().map(|(name, value)| Cookie { name: name.clone(), value: value.clone() }).collect())
            .unwrap_or_default())
    }
}
