//! Error types for fontcache

use std::fmt;
use std::io;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug)]
pub enum Error {
    /// Out-of-range or otherwise unusable input
    InvalidArgument(String),

    /// The manager's cache table is full
    TooManyCaches,

    /// The handle does not name a registered cache of the expected kind
    InvalidCacheHandle,

    /// No slot can be recycled: every candidate holds pinned nodes
    Pinned,

    /// Internal bookkeeping found an inconsistency
    Corrupted(&'static str),

    /// Failure reported by the font engine (face loading, sizing, rendering)
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Wrap a font engine error so it propagates unchanged
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Backend(err.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::TooManyCaches => write!(f, "Too many registered caches"),
            Error::InvalidCacheHandle => write!(f, "Invalid cache handle"),
            Error::Pinned => write!(f, "Every recyclable slot holds pinned nodes"),
            Error::Corrupted(what) => write!(f, "Cache manager is corrupted: {}", what),
            Error::Backend(e) => write!(f, "Font backend error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Backend(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Backend(Box::new(err))
    }
}
