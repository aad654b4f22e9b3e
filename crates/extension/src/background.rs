//! The background process.
//!
//! Owns the authoritative write of `auth` messages into the session store
//! and pulls tokens from open frontend tabs: on `syncToken`, shortly after
//! a frontend tab finishes loading, and on a periodic interval.

use std::time::Duration;

use pricewatch_core::AppConfig;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::browser::{BrowserHub, ListenerId, RuntimeListener, TabEvent};
use crate::protocol::{Envelope, SyncMessage, SyncReply};
use crate::session::SessionTokenStore;

#[derive(Debug, Clone)]
pub struct Background {
    hub: BrowserHub,
    session: SessionTokenStore,
    sync_delay: Duration,
    sync_interval: Option<Duration>,
}

/// The running background loops.
#[derive(Debug)]
pub struct BackgroundHandle {
    hub: BrowserHub,
    listener: ListenerId,
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundHandle {
    pub fn stop(&self) {
        self.hub.remove_listener(self.listener);
        self.tasks.iter().for_each(JoinHandle::abort);
    }
}

impl Drop for BackgroundHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Background {
    pub fn new(hub: BrowserHub, session: SessionTokenStore, config: &AppConfig) -> Self {
        Self {
            hub,
            session,
            sync_delay: config.background_sync_delay(),
            sync_interval: config.background_sync_interval(),
        }
    }

    pub fn spawn(self) -> BackgroundHandle {
        let listener = self.hub.add_listener();
        let listener_id = listener.id;
        let mut tasks = Vec::with_capacity(3);

        let background = self.clone();
        tasks.push(tokio::spawn(async move { background.message_loop(listener).await }));

        let background = self.clone();
        tasks.push(tokio::spawn(async move { background.tab_loop().await }));

        if let Some(period) = self.sync_interval {
            let background = self.clone();
            tasks.push(tokio::spawn(async move { background.sync_loop(period).await }));
        }

        tracing::info!(periodic = ?self.sync_interval, "background started");
        BackgroundHandle { hub: self.hub, listener: listener_id, tasks }
    }

    async fn message_loop(&self, mut listener: RuntimeListener) {
        while let Some(envelope) = listener.inbox.recv().await {
            self.handle(envelope).await;
        }
    }

    async fn handle(&self, envelope: Envelope) {
        let reply = match &envelope.message {
            SyncMessage::Auth { token, user } => {
                self.session.save(token.clone()).await;
                if user.is_some() {
                    self.session.save_user(user.as_ref()).await;
                }
                SyncReply::Ack
            }
            SyncMessage::SyncToken => {
                let background = self.clone();
                tokio::spawn(async move {
                    background.sync_from_tabs().await;
                });
                SyncReply::Ack
            }
            SyncMessage::GetToken | SyncMessage::GetCurrentUrl => SyncReply::NotHandled,
        };
        envelope.respond(reply);
    }

    async fn tab_loop(&self) {
        let mut events = self.hub.subscribe();
        let frontend = self.session.frontend().origin();
        loop {
            match events.recv().await {
                Ok(TabEvent::Completed { id, url }) => {
                    let on_frontend = url::Url::parse(&url).is_ok_and(|u| u.origin() == frontend);
                    if !on_frontend {
                        continue;
                    }
                    tracing::debug!(tab = id, "frontend tab loaded; scheduling sync");
                    let background = self.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(background.sync_delay).await;
                        background.sync_from_tabs().await;
                    });
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "background missed tab events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    async fn sync_loop(&self, period: Duration) {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            self.sync_from_tabs().await;
        }
    }

    /// Ask each open frontend tab for its token and store the first one
    /// found.
    pub async fn sync_from_tabs(&self) -> Option<String> {
        let tabs = self.hub.query_tabs(&self.session.frontend().origin());
        for tab in tabs {
            match self.hub.send_to_tab(tab.id, SyncMessage::GetToken).await {
                Ok(reply) => {
                    if let Some(token) = reply.token() {
                        let token = token.to_string();
                        self.session.save(Some(token.clone())).await;
                        tracing::debug!(tab = tab.id, "token synced from tab");
                        return Some(token);
                    }
                }
                Err(e) => tracing::debug!(tab = tab.id, error = %e, "tab not ready for sync"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::{SessionStorage, StorageDb};
    use serde_json::json;
    use url::Url;

    async fn setup(config: &AppConfig) -> (BrowserHub, SessionTokenStore, BackgroundHandle) {
        let hub = BrowserHub::new();
        let db = StorageDb::open_in_memory().await.unwrap();
        let session = SessionTokenStore::new(SessionStorage::new(db), hub.clone(), Url::parse(&config.frontend_url).unwrap());
        let handle = Background::new(hub.clone(), session.clone(), config).spawn();
        (hub, session, handle)
    }

    fn quiet_config() -> AppConfig {
        AppConfig { background_sync_interval_ms: 0, background_sync_delay_ms: 10, ..Default::default() }
    }

    /// Spawn a fake agent on `tab` that reports `token`.
    fn token_agent(hub: &BrowserHub, tab: crate::browser::TabId, token: &str) {
        let mut inbox = hub.attach_agent(tab).unwrap();
        let reply = SyncReply::Token { token: Some(token.to_string()), user: None };
        tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                envelope.respond(reply.clone());
            }
        });
    }

    async fn wait_for_token(session: &SessionTokenStore, expected: &str) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while session.load().await.as_deref() != Some(expected) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_auth_saves_token_and_user() {
        let (hub, session, _handle) = setup(&quiet_config()).await;

        let reply = hub
            .send_runtime(None, SyncMessage::Auth { token: Some("abc".into()), user: Some(json!({"name": "A"})) })
            .await
            .unwrap();

        assert_eq!(reply, SyncReply::Ack);
        assert_eq!(session.load().await.as_deref(), Some("abc"));
        assert_eq!(session.load_user().await, Some(json!({"name": "A"})));
    }

    #[tokio::test]
    async fn test_auth_logout_clears_token() {
        let (hub, session, _handle) = setup(&quiet_config()).await;
        session.save(Some("abc".into())).await;

        hub.send_runtime(None, SyncMessage::Auth { token: None, user: None }).await.unwrap();
        assert!(session.load().await.is_none());
    }

    #[tokio::test]
    async fn test_declines_tab_requests() {
        let (hub, _session, _handle) = setup(&quiet_config()).await;
        let result = hub.send_runtime(None, SyncMessage::GetToken).await;
        assert!(matches!(result, Err(crate::error::ContextError::Unanswered(_))));
    }

    #[tokio::test]
    async fn test_sync_token_acks_then_pulls() {
        let (hub, session, _handle) = setup(&quiet_config()).await;
        let tab = hub.open_tab("http://localhost:3000/", false);
        token_agent(&hub, tab, "from-tab");

        let reply = hub.send_runtime(None, SyncMessage::SyncToken).await.unwrap();
        assert_eq!(reply, SyncReply::Ack);
        wait_for_token(&session, "from-tab").await;
    }

    #[tokio::test]
    async fn test_sync_after_frontend_tab_completes() {
        let (hub, session, _handle) = setup(&quiet_config()).await;
        let tab = hub.open_tab("http://localhost:3000/auth", false);
        token_agent(&hub, tab, "after-load");

        hub.complete(tab);
        wait_for_token(&session, "after-load").await;
    }

    #[tokio::test]
    async fn test_periodic_sync() {
        let config = AppConfig { background_sync_interval_ms: 20, ..quiet_config() };
        let (hub, session, _handle) = setup(&config).await;
        let tab = hub.open_tab("http://localhost:3000/", false);
        token_agent(&hub, tab, "periodic");

        wait_for_token(&session, "periodic").await;
    }

    #[tokio::test]
    async fn test_ignores_other_origins() {
        let (hub, session, _handle) = setup(&quiet_config()).await;
        let tab = hub.open_tab("https://www.amazon.in/", false);
        token_agent(&hub, tab, "shop");

        hub.complete(tab);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.load().await.is_none());

        let background = Background::new(hub.clone(), session.clone(), &quiet_config());
        assert!(background.sync_from_tabs().await.is_none());
    }
}
