//! The error taxonomy raised by property slots, delegates and the lifecycle
//! state machines built on top of them.
use std::time::Duration;

use crate::ids::{Pid, WindowKey};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the accessibility delegate adapters and propagated up
/// through property slots, window/application lifecycles and `State`.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The OS refused a write as semantically invalid for the target
    /// attribute (e.g. a negative size).
    #[error("the OS rejected the written value as invalid")]
    IllegalValue,

    /// The cross-process accessibility round trip did not complete inside
    /// the configured budget. The slot is *not* invalidated by this error.
    #[error("accessibility request timed out after {0:?}")]
    Timeout(Duration),

    /// A required attribute was absent from the OS element.
    #[error("required attribute was missing from the element")]
    MissingValue,

    /// The underlying accessibility element is permanently gone. Any slot
    /// that reports this transitions to invalid and notifies its owner.
    #[error("underlying accessibility element is no longer valid: {0}")]
    InvalidObject(String),

    /// A retryable failure from the accessibility layer (e.g. the
    /// destination process was busy).
    #[error("transient accessibility failure: {0}")]
    TransientFailure(String),

    /// Internal: a window was rejected by the subrole filter during
    /// initialization and should not be surfaced to callers.
    #[error("window ignored by subrole filter")]
    Ignored,

    /// A request referenced an application `pid` that `State` does not
    /// currently know about.
    #[error("no running application with pid {0}")]
    UnknownApplication(Pid),

    /// A request referenced a window that is not a member of its
    /// application's known window set.
    #[error("unknown window {0:?}")]
    UnknownWindow(WindowKey),

    /// A caller outside the main coordination thread attempted an operation
    /// that is only valid there (event emission, arena mutation). This is a
    /// programming error in the embedding application, not a recoverable
    /// runtime condition.
    #[error("operation attempted off the main coordination thread")]
    NotMainThread,
}

impl Error {
    /// `true` for the subset of errors that permanently invalidate the
    /// element they were raised against.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::InvalidObject(_))
    }
}
