//! The extension runtime for pricewatch.
//!
//! Three kinds of isolated context cooperate over message passing only:
//! the durable [`background`] process, one [`content`] agent per tab and a
//! transient [`popup`]. [`BrowserHub`] is the in-process stand-in for the
//! browser that connects them (tabs, the runtime channel, the cookie jar).
//!
//! Product lookups go through the stale-while-revalidate [`swr`]
//! orchestrator; the logged-in identity goes through the
//! [`session::SessionTokenStore`].

pub mod background;
pub mod browser;
pub mod content;
pub mod error;
pub mod page;
pub mod poll;
pub mod popup;
pub mod protocol;
pub mod session;
pub mod swr;

pub use background::{Background, BackgroundHandle};
pub use browser::{BrowserHub, Cookie, ListenerId, RuntimeListener, TabEvent, TabId, TabInfo};
pub use content::{ContentAgent, ContentAgentHandle};
pub use error::ContextError;
pub use page::{HostPage, MemoryPage, PageSession};
pub use poll::PollPolicy;
pub use popup::{Popup, PopupDeps, PopupView, TrackOutcome};
pub use protocol::{Envelope, SyncMessage, SyncReply};
pub use session::{SessionToken, SessionTokenStore, TokenSource};
pub use swr::{Orchestrator, RefreshOutcome, ResultView, Served};
