//! Cross-context messaging errors.

/// Why a message to another context got no answer.
///
/// None of these are fatal: callers log them and treat the target as
/// having nothing to contribute.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Nothing is listening at the target.
    #[error("NO_RECEIVER: no context listening on {0}")]
    NoReceiver(String),

    /// The target context went away before answering.
    #[error("CONTEXT_CLOSED: {0} was torn down")]
    Closed(String),

    /// Every listener declined the message, or none answered in time.
    #[error("UNANSWERED: no listener handled {0}")]
    Unanswered(String),

    /// The browser refused access (e.g. cookies).
    #[error("ACCESS_DENIED: {0}")]
    Denied(String),
}
