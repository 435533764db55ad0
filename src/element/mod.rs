//! Element framework.
//!
//! An element is one pipeline stage with its own execution context: it owns
//! zero-or-one input channel, zero-or-one output channel, a scratch buffer
//! reused every step, and an open/process/close lifecycle driven by a
//! dedicated task. Control (pause, resume, stop) arrives out-of-band through
//! a bounded message queue, never through the data path.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --open()--> Playing <---> Paused      (explicit control messages)
//!                        |  ^
//!                        v  |                   (implicit, internal)
//!                      Waiting                  (input empty, not an error)
//! any --Stop--> loop exits, close(), task ends
//! ```
//!
//! Teardown is two-phase: the task drains, closes and *returns*; the caller
//! that holds the [`ElementHandle`](runner::ElementHandle) joins it and frees
//! the element from outside. An element never destroys itself from its own
//! task.

mod context;
mod runner;

pub use context::ElementContext;
pub use runner::{spawn, ElementHandle};

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::io::IoChannel;

/// Default scratch buffer length in bytes.
pub const DEFAULT_SCRATCH_LEN: usize = 2048;
/// Default bounded wait for input reads and output writes.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(100);
/// Control queue depth per element.
pub(crate) const CONTROL_QUEUE_LEN: usize = 16;

/// Element lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Not running (initial state, and final after Stop).
    Stopped = 0,
    /// Processing data.
    Playing = 1,
    /// Paused by a control message; consumes control only.
    Paused = 2,
    /// No input data yet; recovers to Playing on data. Internal, not an error.
    Waiting = 3,
}

impl Status {
    fn from_u8(v: u8) -> Status {
        match v {
            1 => Status::Playing,
            2 => Status::Paused,
            3 => Status::Waiting,
            _ => Status::Stopped,
        }
    }

    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Stopped => "STOPPED",
            Status::Playing => "PLAYING",
            Status::Paused => "PAUSED",
            Status::Waiting => "WAITING",
        }
    }
}

/// Atomic status cell shared between an element task and its handle.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    /// Create a cell holding `status`.
    pub fn new(status: Status) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    /// Read the current status.
    pub fn get(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replace the status.
    pub fn set(&self, status: Status) {
        self.0.store(status as u8, Ordering::Release);
    }
}

/// Out-of-band control messages delivered to an element task.
///
/// Delivery doubles as a wakeup: a paused task blocks on its control queue,
/// so a message unblocks it immediately.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Request a lifecycle transition (Playing/Paused).
    SetStatus(Status),
    /// Exit the processing loop, close, and end the task.
    Stop,
    /// Extension point. Unknown ids are logged and ignored, never fatal.
    Custom {
        /// Application-defined message id.
        id: u32,
        /// Opaque payload.
        payload: Bytes,
    },
}

/// Open-time parameter passed to [`ElementOps::open`]: a device name, file
/// path, or nothing.
#[derive(Debug, Clone, Default)]
pub struct OpenParams {
    /// Target resource (file path, device name), if the element needs one.
    pub target: Option<String>,
}

impl OpenParams {
    /// Params carrying a target string.
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
        }
    }
}

/// Lifecycle callbacks implemented by each element kind.
///
/// The generic task driver is written once against this trait; sources,
/// sinks, the mixer and passthrough stages are implementations.
pub trait ElementOps: Send {
    /// Acquire the underlying resource. Called exactly once, before the
    /// processing loop. A [`Error::ResourceUnavailable`] here keeps the loop
    /// from ever running.
    fn open(&mut self, ctx: &mut ElementContext, params: &OpenParams) -> Result<()> {
        let _ = (ctx, params);
        Ok(())
    }

    /// One processing step. The default is a read-then-write passthrough
    /// that propagates format changes; override for transformation.
    ///
    /// Returns the number of bytes moved; `Ok(0)` means "no data yet"
    /// (distinct from a write failure, which is `Err(ChannelFull)`).
    fn process(&mut self, ctx: &mut ElementContext) -> Result<usize> {
        ctx.passthrough_step()
    }

    /// Release resources. Called once when the loop exits.
    fn close(&mut self, ctx: &mut ElementContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }
}

/// Configuration for building an [`Element`].
#[derive(Debug)]
pub struct ElementConfig {
    /// Stable tag for logs and thread naming.
    pub tag: String,
    /// Upstream channel, if any.
    pub input: Option<IoChannel>,
    /// Downstream channel, if any (none = terminal sink).
    pub output: Option<IoChannel>,
    /// Scratch buffer length in bytes.
    pub scratch_len: usize,
    /// Bounded wait for input reads.
    pub read_timeout: Duration,
    /// Bounded wait per output write attempt.
    pub write_timeout: Duration,
    /// Parameter handed to `open()`.
    pub open_params: OpenParams,
}

impl ElementConfig {
    /// Config with defaults and the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            input: None,
            output: None,
            scratch_len: DEFAULT_SCRATCH_LEN,
            read_timeout: DEFAULT_IO_TIMEOUT,
            write_timeout: DEFAULT_IO_TIMEOUT,
            open_params: OpenParams::default(),
        }
    }

    /// Set the input channel.
    pub fn with_input(mut self, input: IoChannel) -> Self {
        self.input = Some(input);
        self
    }

    /// Set the output channel.
    pub fn with_output(mut self, output: IoChannel) -> Self {
        self.output = Some(output);
        self
    }

    /// Set the scratch buffer length.
    pub fn with_scratch_len(mut self, len: usize) -> Self {
        self.scratch_len = len;
        self
    }

    /// Set the input read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the open-time parameter.
    pub fn with_open_params(mut self, params: OpenParams) -> Self {
        self.open_params = params;
        self
    }
}

/// A pipeline stage: context plus lifecycle callbacks.
pub struct Element {
    ctx: ElementContext,
    ops: Box<dyn ElementOps>,
    open_params: OpenParams,
    is_open: bool,
}

impl Element {
    /// Build an element from its config and callbacks.
    pub fn new(config: ElementConfig, ops: impl ElementOps + 'static) -> Self {
        Self::from_boxed(config, Box::new(ops))
    }

    pub(crate) fn from_boxed(config: ElementConfig, ops: Box<dyn ElementOps>) -> Self {
        let ctx = ElementContext::new(
            config.tag,
            config.input,
            config.output,
            config.scratch_len,
            config.read_timeout,
            config.write_timeout,
        );
        Self {
            ctx,
            ops,
            open_params: config.open_params,
            is_open: false,
        }
    }

    /// The element's tag.
    pub fn tag(&self) -> &str {
        self.ctx.tag()
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.ctx.status()
    }

    pub(crate) fn status_cell(&self) -> std::sync::Arc<StatusCell> {
        self.ctx.status_cell()
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.ctx.set_status(status);
    }

    /// A clone of the output channel, for linking downstream stages.
    pub fn output(&self) -> Option<IoChannel> {
        self.ctx.output().cloned()
    }

    /// Whether the element reads from an upstream channel.
    pub fn has_input(&self) -> bool {
        self.ctx.input().is_some()
    }

    /// Acquire resources and transition out of `Stopped`.
    ///
    /// Fails with [`Error::AlreadyOpen`] on a second call and with whatever
    /// the ops report (typically `ResourceUnavailable`) when the underlying
    /// resource cannot be acquired.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open {
            return Err(Error::AlreadyOpen(self.ctx.tag().to_string()));
        }
        let params = self.open_params.clone();
        self.ops.open(&mut self.ctx, &params)?;
        self.is_open = true;
        // An element with an input starts Waiting until data shows up.
        let initial = if self.ctx.input().is_some() {
            Status::Waiting
        } else {
            Status::Playing
        };
        self.ctx.set_status(initial);
        Ok(())
    }

    /// Run one processing step.
    pub fn process_step(&mut self) -> Result<usize> {
        self.ops.process(&mut self.ctx)
    }

    /// Release resources. Safe to call when not open.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        self.ops.close(&mut self.ctx)
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.ctx.tag())
            .field("status", &self.ctx.status())
            .field("is_open", &self.is_open)
            .finish()
    }
}
