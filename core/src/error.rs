//! Error taxonomy and terminal stream state.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use talkbox_buffer::BufferError;

/// Stream status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// A normal chunk; more may follow.
    Ok,
    /// Clean completion.
    Done,
    /// Generation ran out of budget mid-stream.
    Truncated,
    /// The upstream refused to produce output.
    Blocked,
    /// The stream failed.
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Done => write!(f, "done"),
            Status::Truncated => write!(f, "truncated"),
            Status::Blocked => write!(f, "blocked"),
            Status::Error => write!(f, "error"),
        }
    }
}

/// Token usage counters reported with a terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub cached_content_tokens: i64,
    pub generated_tokens: i64,
}

impl Usage {
    pub fn new(prompt: i64, cached: i64, generated: i64) -> Self {
        Self {
            prompt_tokens: prompt,
            cached_content_tokens: cached,
            generated_tokens: generated,
        }
    }

    pub fn total(&self) -> i64 {
        self.prompt_tokens + self.generated_tokens
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "usage(prompt={}, cached={}, generated={})",
            self.prompt_tokens, self.cached_content_tokens, self.generated_tokens
        )
    }
}

/// Marker cause for a cleanly finished stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrDone;

impl fmt::Display for ErrDone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream done")
    }
}

impl Error for ErrDone {}

/// Marker cause for a truncated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrTruncated;

impl fmt::Display for ErrTruncated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response truncated")
    }
}

impl Error for ErrTruncated {}

/// The refusal carried by a blocked stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal(pub String);

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for Refusal {}

#[derive(Debug)]
struct Failure(String);

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for Failure {}

/// Terminal state of a stream: status, usage counters, and the underlying
/// cause. Every stream-producing component surfaces exactly one terminal
/// state per invocation before EOF.
///
/// `State` implements `std::error::Error`; [`cause`](State::cause) (also
/// exposed through `source()`) yields [`ErrDone`] for clean termination,
/// the [`Refusal`] for blocked, [`ErrTruncated`] for truncation, and the
/// wrapped error otherwise.
#[derive(Debug, Clone)]
pub struct State {
    status: Status,
    usage: Usage,
    cause: Arc<dyn Error + Send + Sync>,
}

impl State {
    pub fn done(usage: Usage) -> Self {
        Self {
            status: Status::Done,
            usage,
            cause: Arc::new(ErrDone),
        }
    }

    pub fn truncated(usage: Usage) -> Self {
        Self {
            status: Status::Truncated,
            usage,
            cause: Arc::new(ErrTruncated),
        }
    }

    pub fn blocked(usage: Usage, refusal: impl Into<String>) -> Self {
        Self {
            status: Status::Blocked,
            usage,
            cause: Arc::new(Refusal(refusal.into())),
        }
    }

    pub fn failed(usage: Usage, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            usage,
            cause: Arc::new(Failure(message.into())),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    /// The underlying cause, the `errors.Unwrap` analogue.
    pub fn cause(&self) -> &(dyn Error + 'static) {
        self.cause.as_ref()
    }

    /// The refusal string when this is a blocked state.
    pub fn refusal(&self) -> Option<&str> {
        self.cause.downcast_ref::<Refusal>().map(|r| r.0.as_str())
    }

    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Status::Blocked => write!(f, "stream blocked: {} ({})", self.cause, self.usage),
            Status::Error => write!(f, "stream error: {} ({})", self.cause, self.usage),
            _ => write!(f, "stream {}: {}", self.status, self.usage),
        }
    }
}

impl Error for State {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// Error type for core stream operations.
#[derive(Debug, ThisError)]
pub enum CoreError {
    /// A terminal stream state (done / truncated / blocked / error).
    #[error(transparent)]
    State(#[from] State),

    /// A named tool was not registered in the model context.
    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    /// A transformer or session was configured with invalid values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backing buffer was closed.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// The terminal state, when this error is one.
    pub fn state(&self) -> Option<&State> {
        match self {
            CoreError::State(s) => Some(s),
            _ => None,
        }
    }

    /// The status expressed by this error.
    pub fn status(&self) -> Status {
        match self {
            CoreError::State(s) => s.status(),
            _ => Status::Error,
        }
    }

    /// True when this is a clean `done` termination.
    pub fn is_done(&self) -> bool {
        matches!(self, CoreError::State(s) if s.is_done())
    }

    /// Wraps an arbitrary message as an opaque error.
    pub fn msg(message: impl fmt::Display) -> Self {
        CoreError::Other(anyhow::anyhow!("{message}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(Status::Done.to_string(), "done");
        assert_eq!(Status::Blocked.to_string(), "blocked");
    }

    #[test]
    fn usage_totals() {
        let usage = Usage::new(100, 10, 50);
        assert_eq!(usage.total(), 150);
        assert!(usage.to_string().contains("cached=10"));
    }

    #[test]
    fn done_state_unwraps_to_marker() {
        let state = State::done(Usage::new(10, 0, 5));
        assert_eq!(state.status(), Status::Done);
        assert!(state.is_done());
        assert!(state.cause().downcast_ref::<ErrDone>().is_some());
        assert!(state.source().is_some());
    }

    #[test]
    fn blocked_state_unwraps_to_refusal() {
        let state = State::blocked(Usage::default(), "safety");
        assert_eq!(state.status(), Status::Blocked);
        assert_eq!(state.refusal(), Some("safety"));
        assert!(state.to_string().contains("safety"));
    }

    #[test]
    fn truncated_state_marker() {
        let state = State::truncated(Usage::new(50, 0, 100));
        assert_eq!(state.status(), Status::Truncated);
        assert!(state.cause().downcast_ref::<ErrTruncated>().is_some());
        assert_eq!(state.usage().generated_tokens, 100);
    }

    #[test]
    fn failed_state_carries_message() {
        let state = State::failed(Usage::default(), "upstream 500");
        assert_eq!(state.status(), Status::Error);
        assert!(state.to_string().contains("upstream 500"));
    }

    #[test]
    fn core_error_status_mapping() {
        let done = CoreError::State(State::done(Usage::default()));
        assert!(done.is_done());
        assert_eq!(done.status(), Status::Done);

        let not_found = CoreError::ToolNotFound {
            name: "search".into(),
        };
        assert_eq!(not_found.status(), Status::Error);
        assert!(not_found.to_string().contains("search"));
    }
}
