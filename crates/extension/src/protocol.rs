//! The message contract between contexts.
//!
//! A message has exactly one logical reply, delivered through the
//! [`Envelope`] it travels in. There are no correlation ids: a context
//! must not start a second exchange for the same purpose before the
//! first resolves. Handlers that have nothing to say answer
//! [`SyncReply::NotHandled`] rather than leaving the sender waiting.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

/// A request sent to another context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SyncMessage {
    /// A context observed a login (`Some`) or logout (`None`).
    Auth {
        #[serde(default)]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<Value>,
    },
    /// Ask a content agent for its page's token.
    GetToken,
    /// Ask a content agent for its page's URL.
    GetCurrentUrl,
    /// Ask the background process to pull tokens from open frontend tabs.
    SyncToken,
}

impl SyncMessage {
    /// Wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            SyncMessage::Auth { .. } => "auth",
            SyncMessage::GetToken => "getToken",
            SyncMessage::GetCurrentUrl => "getCurrentUrl",
            SyncMessage::SyncToken => "syncToken",
        }
    }
}

/// The answer to a [`SyncMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "camelCase")]
pub enum SyncReply {
    Ack,
    Token { token: Option<String>, user: Option<Value> },
    CurrentUrl { url: String },
    NotHandled,
}

impl SyncReply {
    pub fn is_handled(&self) -> bool {
        !matches!(self, SyncReply::NotHandled)
    }

    /// The non-empty token carried by a `Token` reply.
    pub fn token(&self) -> Option<&str> {
        match self {
            SyncReply::Token { token: Some(token), .. } if !token.is_empty() => Some(token),
            _ => None,
        }
    }
}

/// A message in flight together with its reply slot.
#[derive(Debug)]
pub struct Envelope {
    pub message: SyncMessage,
    reply: oneshot::Sender<SyncReply>,
}

impl Envelope {
    pub fn new(message: SyncMessage) -> (Self, oneshot::Receiver<SyncReply>) {
        let (reply, rx) = oneshot::channel();
        (Self { message, reply }, rx)
    }

    /// Answer the sender. A sender that stopped waiting is not an error.
    pub fn respond(self, reply: SyncReply) {
        if self.reply.send(reply).is_err() {
            tracing::debug!(action = self.message.action(), "sender stopped waiting for reply");
        }
    }
}
