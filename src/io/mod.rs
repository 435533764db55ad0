//! Element input/output channels.
//!
//! An [`IoChannel`] is a single point-to-point, byte-oriented link between a
//! writer and a reader. It is backed either by a bounded byte FIFO
//! ([`ByteChannel`]) or by a pair of caller-supplied push/pull functions
//! (e.g. a hardware driver's write routine). Exactly one backing is active
//! per channel; the two cannot be confused because the backing is a tagged
//! enum, not a union.
//!
//! Every channel also carries a [`SharedFormat`] describing the PCM stream
//! flowing through it, written by the upstream element and read (once per
//! change) by the downstream one.

mod ring;

pub use ring::ByteChannel;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::format::SharedFormat;

/// Caller-supplied push function: writes bytes to the external resource.
pub type PushFn = dyn Fn(&[u8], Duration) -> Result<usize> + Send + Sync;
/// Caller-supplied pull function: reads bytes from the external resource.
pub type PullFn = dyn Fn(&mut [u8], Duration) -> Result<usize> + Send + Sync;

/// Callback-backed channel: no buffering of its own, ownership of the
/// backing resource stays with the external driver.
#[derive(Clone)]
pub struct CallbackIo {
    push: Arc<PushFn>,
    pull: Arc<PullFn>,
}

#[derive(Clone)]
enum Backing {
    Buffered(ByteChannel),
    Callback(CallbackIo),
}

/// A point-to-point byte link with an attached stream format.
///
/// Cloning yields another handle to the same link; a channel is shared by at
/// most two elements (writer and reader), each using it from its own task.
#[derive(Clone)]
pub struct IoChannel {
    backing: Backing,
    format: SharedFormat,
}

impl IoChannel {
    /// Create a buffered channel with a fixed byte capacity.
    pub fn buffered(capacity: usize) -> Self {
        Self {
            backing: Backing::Buffered(ByteChannel::new(capacity)),
            format: SharedFormat::default(),
        }
    }

    /// Create a buffered channel with an explicit initial format.
    pub fn buffered_with_format(capacity: usize, format: crate::format::StreamFormat) -> Self {
        Self {
            backing: Backing::Buffered(ByteChannel::new(capacity)),
            format: SharedFormat::new(format),
        }
    }

    /// Create a callback channel from push/pull functions.
    ///
    /// A pure producer boundary can pass a pull that always returns `Ok(0)`,
    /// and vice versa.
    pub fn callback<P, Q>(push: P, pull: Q) -> Self
    where
        P: Fn(&[u8], Duration) -> Result<usize> + Send + Sync + 'static,
        Q: Fn(&mut [u8], Duration) -> Result<usize> + Send + Sync + 'static,
    {
        Self {
            backing: Backing::Callback(CallbackIo {
                push: Arc::new(push),
                pull: Arc::new(pull),
            }),
            format: SharedFormat::default(),
        }
    }

    /// Write bytes into the channel, blocking up to `timeout`.
    ///
    /// Returns the number of bytes accepted; [`Error::ChannelFull`]
    /// (buffered) if the deadline passes with zero bytes accepted.
    ///
    /// [`Error::ChannelFull`]: crate::error::Error::ChannelFull
    pub fn push(&self, bytes: &[u8], timeout: Duration) -> Result<usize> {
        match &self.backing {
            Backing::Buffered(ch) => ch.push(bytes, timeout),
            Backing::Callback(cb) => (cb.push)(bytes, timeout),
        }
    }

    /// Read bytes from the channel, blocking up to `timeout`.
    ///
    /// Zero is a valid result meaning "no data yet".
    pub fn pop(&self, out: &mut [u8], timeout: Duration) -> Result<usize> {
        match &self.backing {
            Backing::Buffered(ch) => ch.pop(out, timeout),
            Backing::Callback(cb) => (cb.pull)(out, timeout),
        }
    }

    /// Mark the channel finished (buffered only; a no-op for callbacks,
    /// where the external driver owns the resource).
    pub fn close(&self) {
        if let Backing::Buffered(ch) = &self.backing {
            ch.close();
        }
    }

    /// Bytes currently buffered (0 for callback channels).
    pub fn buffered_len(&self) -> usize {
        match &self.backing {
            Backing::Buffered(ch) => ch.len(),
            Backing::Callback(_) => 0,
        }
    }

    /// True for the buffered variant.
    pub fn is_buffered(&self) -> bool {
        matches!(self.backing, Backing::Buffered(_))
    }

    /// The stream format attached to this channel.
    pub fn format(&self) -> &SharedFormat {
        &self.format
    }
}

impl std::fmt::Debug for IoChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backing {
            Backing::Buffered(ch) => f
                .debug_struct("IoChannel")
                .field("backing", &"buffered")
                .field("len", &ch.len())
                .field("capacity", &ch.capacity())
                .finish(),
            Backing::Callback(_) => f
                .debug_struct("IoChannel")
                .field("backing", &"callback")
                .finish(),
        }
    }
}
