//! The session token store and token discovery.
//!
//! Durable storage holds the one current token. Every write goes through
//! [`SessionTokenStore::save`], which also notifies subscribers so views
//! that depend on the login state can refresh. Failures never escape:
//! storage errors read as "no token" and an unreachable peer is skipped.

use pricewatch_core::{SessionStorage, token_fingerprint};
use serde_json::Value;
use tokio::sync::watch;
use url::Url;

use crate::browser::BrowserHub;
use crate::protocol::SyncMessage;

const TOKEN_COOKIES: &[&str] = &["token", "authToken"];

/// Where a discovered token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Storage,
    TabQuery,
    Cookie,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub value: String,
    pub source: TokenSource,
}

/// Shared handle to the session. Clones share storage and subscribers.
#[derive(Debug, Clone)]
pub struct SessionTokenStore {
    storage: SessionStorage,
    hub: BrowserHub,
    frontend: Url,
    changes: watch::Sender<Option<String>>,
}

impl SessionTokenStore {
    pub fn new(storage: SessionStorage, hub: BrowserHub, frontend: Url) -> Self {
        let (changes, _) = watch::channel(None);
        Self { storage, hub, frontend, changes }
    }

    pub fn frontend(&self) -> &Url {
        &self.frontend
    }

    /// The stored token, or `None` when absent or unreadable.
    pub async fn load(&self) -> Option<String> {
        match self.storage.load_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read session token");
                None
            }
        }
    }

    /// Replace the stored token (`None` logs out) and notify subscribers.
    ///
    /// Subscribers are notified on every call, including when the value
    /// did not change.
    pub async fn save(&self, token: Option<String>) {
        let token = token.filter(|t| !t.is_empty());
        if let Err(e) = self.storage.save_token(token.as_deref()).await {
            tracing::warn!(error = %e, "failed to persist session token");
        }
        match &token {
            Some(t) => tracing::info!(token = %token_fingerprint(t), "session token saved"),
            None => tracing::info!("session cleared"),
        }
        self.changes.send_replace(token);
    }

    pub async fn load_user(&self) -> Option<Value> {
        self.storage.load_user().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read session user");
            None
        })
    }

    pub async fn save_user(&self, user: Option<&Value>) {
        if let Err(e) = self.storage.save_user(user).await {
            tracing::warn!(error = %e, "failed to persist session user");
        }
    }

    /// Receive the token passed to every subsequent [`save`](Self::save).
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.changes.subscribe()
    }

    /// Find a token: storage, then open frontend tabs, then the cookie jar.
    ///
    /// The first non-empty value wins. Returns `None` when every source
    /// comes up empty or fails.
    pub async fn discover(&self) -> Option<SessionToken> {
        if let Some(value) = self.load().await {
            return Some(SessionToken { value, source: TokenSource::Storage });
        }
        self.from_peers().await
    }

    /// Look for a token held by peers (tabs, then cookies) and store it when
    /// it differs from the stored one.
    pub async fn pull_from_peers(&self) -> Option<SessionToken> {
        let found = self.from_peers().await?;
        if self.load().await.as_deref() != Some(found.value.as_str()) {
            tracing::debug!(source = ?found.source, "peer holds a newer token");
            self.save(Some(found.value.clone())).await;
        }
        Some(found)
    }

    async fn from_peers(&self) -> Option<SessionToken> {
        if let Some(value) = self.from_tabs().await {
            return Some(SessionToken { value, source: TokenSource::TabQuery });
        }
        self.from_cookies().map(|value| SessionToken { value, source: TokenSource::Cookie })
    }

    async fn from_tabs(&self) -> Option<String> {
        let tabs = self.hub.query_tabs(&self.frontend.origin());
        for tab in tabs {
            match self.hub.send_to_tab(tab.id, SyncMessage::GetToken).await {
                Ok(reply) => {
                    if let Some(token) = reply.token() {
                        return Some(token.to_string());
                    }
                }
                Err(e) => tracing::debug!(tab = tab.id, error = %e, "tab did not answer getToken"),
            }
        }
        None
    }

    fn from_cookies(&self) -> Option<String> {
        let host = self.frontend.host_str()?;
        match self.hub.cookies(host) {
            Ok(cookies) => cookies
                .into_iter()
                .find(|c| TOKEN_COOKIES.contains(&c.name.as_str()) && !c.value.is_empty())
                .map(|c| c.value),
            Err(e) => {
                tracing::debug!(error = %e, "cookie lookup failed");
                None
            }
        }
    }
}
