//! Buffer error and iterator sentinel types.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Error returned by buffer operations on a closed buffer.
#[derive(Debug, Clone)]
pub enum BufferError {
    /// The write side was closed; no further writes are accepted.
    Closed,
    /// The buffer was closed with an error; all operations report it.
    ClosedWithError(Arc<dyn Error + Send + Sync>),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Closed => write!(f, "buffer: closed pipe"),
            BufferError::ClosedWithError(e) => write!(f, "buffer: closed: {e}"),
        }
    }
}

impl Error for BufferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BufferError::ClosedWithError(e) => Some(e.as_ref()),
            BufferError::Closed => None,
        }
    }
}

/// Sentinel returned by `next()` once a write-closed buffer is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Done;

impl fmt::Display for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer: done")
    }
}

impl Error for Done {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn display_renders_cause() {
        assert_eq!(BufferError::Closed.to_string(), "buffer: closed pipe");

        let cause: Arc<dyn Error + Send + Sync> = Arc::new(io::Error::other("session reset"));
        let err = BufferError::ClosedWithError(cause);
        assert!(err.to_string().contains("session reset"));
        assert!(err.source().is_some());
    }

    #[test]
    fn done_is_comparable() {
        assert_eq!(Done, Done);
        assert_eq!(Done.to_string(), "buffer: done");
    }
}
