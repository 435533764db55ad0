//! Error types for tributary.

use thiserror::Error;

/// Result type alias using tributary's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tributary operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The underlying hardware or protocol resource could not be acquired.
    ///
    /// Fatal to the element that reported it: its task never enters the
    /// processing loop.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A push into a bounded channel made no progress before the deadline.
    ///
    /// Recoverable and expected under load; the caller retries or treats the
    /// step as zero progress.
    #[error("channel full: no bytes accepted within the timeout")]
    ChannelFull,

    /// A pop from a bounded channel found no data before the deadline.
    ///
    /// Most read paths report this as a zero-byte read instead; the variant
    /// exists for callers that need to distinguish "empty" explicitly.
    #[error("channel empty: no bytes available within the timeout")]
    ChannelEmpty,

    /// The other end of a channel is gone and the buffer is drained.
    #[error("channel closed")]
    Closed,

    /// `open()` was called on an element that is already open.
    #[error("element '{0}' is already open")]
    AlreadyOpen(String),

    /// A source kind was registered twice.
    #[error("source {0} is already registered")]
    AlreadyRegistered(&'static str),

    /// The registry's fixed slot table is full.
    ///
    /// Fatal to the registration attempt only.
    #[error("source registry full ({0} slots)")]
    CapacityExceeded(usize),

    /// A stream format the pipeline cannot represent (zero rate, unsupported
    /// bit depth, zero channels).
    #[error("invalid stream format: {0}")]
    InvalidFormat(String),

    /// I/O error from an external collaborator (file source boundary).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
