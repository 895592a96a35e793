#![forbid(unsafe_code)]

//! Error taxonomy for the proxy layer.
//!
//! Nothing here is fatal to the process: every variant propagates to the
//! immediate caller of the failing operation, and only the transport
//! collaborator may decide a connection-level failure is fatal.

use thiserror::Error;

/// Result alias used throughout the tether crates.
pub type Result<T> = std::result::Result<T, Error>;

/// An error surfaced by a proxy-layer operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A fetch failed or produced no usable data. Recoverable: the slot
    /// is returned to Empty and the next read retries.
    #[error("attribute unavailable: {reason}")]
    Unavailable {
        /// Human-readable cause (transport failure, empty reply, ...).
        reason: String,
    },

    /// The caller tried to write a read-only attribute.
    #[error("attribute is read-only: {attribute}")]
    ReadOnly {
        /// The offending attribute.
        attribute: &'static str,
    },

    /// The caller tried to invalidate an attribute whose cache must not
    /// be cleared.
    #[error("attribute cannot be invalidated: {attribute}")]
    Undeletable {
        /// The offending attribute.
        attribute: &'static str,
    },

    /// The operation targeted a resource whose handle is no longer
    /// valid. Recoverable by discarding the proxy reference.
    #[error("resource has been destroyed")]
    Destroyed,

    /// The server returned an explicit error for a request. Surfaced to
    /// the caller of that specific read/write, not fatal to the
    /// connection.
    #[error("server error {code}: {detail}")]
    Protocol {
        /// Server error code.
        code: u16,
        /// Decoded error payload.
        detail: String,
    },
}

impl Error {
    /// Shorthand for [`Error::Unavailable`].
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether retrying the operation may succeed without the caller
    /// changing anything.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
