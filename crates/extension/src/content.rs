//! The content agent: one per tab.
//!
//! Every agent answers `getCurrentUrl` and `getToken`. On frontend pages it
//! also pushes the page's session to the extension: once at load, whenever
//! a poll sees the token change, and when the page reports a storage
//! change through [`ContentAgentHandle::notify_storage_changed`].

use std::sync::Arc;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::browser::{BrowserHub, TabId};
use crate::page::{HostPage, PageSession, raw_token_cookie};
use crate::poll::PollPolicy;
use crate::protocol::{Envelope, SyncMessage, SyncReply};

/// What the agent compares between polls.
#[derive(Debug, Clone, Default, PartialEq)]
struct Observed {
    token: Option<String>,
    cookie: Option<String>,
}

impl Observed {
    fn read(page: &dyn HostPage) -> Self {
        Self { token: PageSession::read(page).token, cookie: raw_token_cookie(page) }
    }
}

pub struct ContentAgent {
    hub: BrowserHub,
    tab: TabId,
    page: Arc<dyn HostPage>,
    frontend: Url,
    policy: PollPolicy,
}

/// Running agent. Dropping it leaves the agent running until its tab
/// navigates or closes; [`stop`](Self::stop) ends it at once.
#[derive(Debug)]
pub struct ContentAgentHandle {
    storage_changed: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ContentAgentHandle {
    /// The page's session storage changed (storage, `tokenUpdate` or
    /// `authUpdate` events). Triggers an immediate sync.
    pub fn notify_storage_changed(&self) {
        self.storage_changed.notify_one();
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl ContentAgent {
    pub fn new(hub: BrowserHub, tab: TabId, page: Arc<dyn HostPage>, frontend: Url, policy: PollPolicy) -> Self {
        Self { hub, tab, page, frontend, policy }
    }

    /// Attach to the tab and start serving. Returns `None` if the tab is gone.
    pub fn spawn(self) -> Option<ContentAgentHandle> {
        let inbox = self.hub.attach_agent(self.tab)?;
        let storage_changed = Arc::new(Notify::new());
        let notify = storage_changed.clone();
        let task = tokio::spawn(async move { self.run(inbox, notify).await });
        Some(ContentAgentHandle { storage_changed, task })
    }

    fn on_frontend(&self) -> bool {
        Url::parse(&self.page.url()).is_ok_and(|u| u.origin() == self.frontend.origin())
    }

    async fn run(self, mut inbox: mpsc::Receiver<Envelope>, storage_changed: Arc<Notify>) {
        let watching = self.on_frontend();
        tracing::debug!(tab = self.tab, watching, "content agent started");

        let mut last = Observed::default();
        if watching {
            last = Observed::read(self.page.as_ref());
            self.sync_to_extension().await;
        }

        let mut delay = self.policy.interval;
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.handle(envelope),
                    None => break,
                },
                _ = storage_changed.notified(), if watching => {
                    last = Observed::read(self.page.as_ref());
                    self.sync_to_extension().await;
                }
                _ = &mut sleep, if watching => {
                    let now = Observed::read(self.page.as_ref());
                    let changed = now != last;
                    if changed {
                        tracing::debug!(tab = self.tab, "page session changed");
                        last = now;
                        self.sync_to_extension().await;
                    }
                    delay = self.policy.next_delay(delay, changed);
                    sleep.as_mut().reset(Instant::now() + delay);
                }
            }
        }

        tracing::debug!(tab = self.tab, "content agent detached");
    }

    fn handle(&self, envelope: Envelope) {
        let reply = match &envelope.message {
            SyncMessage::GetCurrentUrl => SyncReply::CurrentUrl { url: self.page.url() },
            SyncMessage::GetToken => {
                let session = PageSession::read(self.page.as_ref());
                if let Some(token) = &session.token {
                    let hub = self.hub.clone();
                    let message = SyncMessage::Auth { token: Some(token.clone()), user: session.user.clone() };
                    tokio::spawn(async move {
                        if let Err(e) = hub.send_runtime(None, message).await {
                            tracing::debug!(error = %e, "auth push unanswered");
                        }
                    });
                }
                SyncReply::Token { token: session.token, user: session.user }
            }
            SyncMessage::Auth { .. } | SyncMessage::SyncToken => SyncReply::NotHandled,
        };
        envelope.respond(reply);
    }

    /// Send the page's current session, or a logout when it has none.
    async fn sync_to_extension(&self) {
        let session = PageSession::read(self.page.as_ref());
        let message = match session.token {
            Some(token) => SyncMessage::Auth { token: Some(token), user: session.user },
            None => SyncMessage::Auth { token: None, user: None },
        };
        if let Err(e) = self.hub.send_runtime(None, message).await {
            tracing::debug!(tab = self.tab, error = %e, "session sync unanswered");
        }
    }
}
