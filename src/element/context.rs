//! Element runtime context.
//!
//! The context owns everything an element's callbacks work against: the
//! optional input/output channels, the scratch buffer reused every processing
//! step, and the status cell other tasks observe.

use std::sync::Arc;
use std::time::Duration;

use crate::element::{Status, StatusCell};
use crate::error::{Error, Result};
use crate::io::IoChannel;

/// Runtime context for an element.
pub struct ElementContext {
    tag: String,
    input: Option<IoChannel>,
    output: Option<IoChannel>,
    /// Fixed-capacity working buffer, reused every step. Never grows.
    scratch: Box<[u8]>,
    status: Arc<StatusCell>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ElementContext {
    pub(crate) fn new(
        tag: String,
        input: Option<IoChannel>,
        output: Option<IoChannel>,
        scratch_len: usize,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            tag,
            input,
            output,
            scratch: vec![0u8; scratch_len].into_boxed_slice(),
            status: Arc::new(StatusCell::new(Status::Stopped)),
            read_timeout,
            write_timeout,
        }
    }

    /// The element's tag, used in logs and diagnostics.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The input channel, if this element has one.
    ///
    /// An element without an input never reads upstream; its data arrives
    /// externally (e.g. via a hardware callback).
    pub fn input(&self) -> Option<&IoChannel> {
        self.input.as_ref()
    }

    /// The output channel. An element without one is a terminal sink.
    pub fn output(&self) -> Option<&IoChannel> {
        self.output.as_ref()
    }

    /// Replace the input channel (used by pipeline linking before spawn).
    pub fn set_input(&mut self, input: IoChannel) {
        self.input = Some(input);
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.status.set(status);
    }

    pub(crate) fn status_cell(&self) -> Arc<StatusCell> {
        Arc::clone(&self.status)
    }

    /// The scratch buffer for this step.
    pub fn scratch(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    /// The bounded wait used for input reads.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Propagate an upstream format change to the output channel, if any.
    ///
    /// Returns the new format when one was consumed, so overriding elements
    /// can update their own state exactly once per change.
    pub fn take_format_change(&self) -> Option<crate::format::StreamFormat> {
        let input = self.input.as_ref()?;
        let fmt = input.format().take_changed()?;
        tracing::debug!(tag = %self.tag, ?fmt, "input format changed, updating output");
        if let Some(output) = &self.output {
            output.format().update(fmt);
        }
        Some(fmt)
    }

    /// Read up to one scratch buffer's worth of bytes from the input.
    ///
    /// Returns 0 when the element has no input or no data arrived within the
    /// read timeout.
    pub fn fill_from_input(&mut self) -> Result<usize> {
        let Some(input) = &self.input else {
            return Ok(0);
        };
        input.pop(&mut self.scratch, self.read_timeout)
    }

    /// Write exactly `len` bytes of scratch to the output.
    ///
    /// Retries partial pushes within the write timeout per attempt; maps a
    /// dead-end (zero accepted) to [`Error::ChannelFull`] so the caller can
    /// tell "write failed" apart from "nothing to do".
    pub fn flush_to_output(&self, len: usize) -> Result<usize> {
        let Some(output) = &self.output else {
            return Ok(0);
        };
        let mut written = 0;
        while written < len {
            match output.push(&self.scratch[written..len], self.write_timeout) {
                Ok(0) => return Err(Error::ChannelFull),
                Ok(n) => written += n,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    /// Default processing step: read-then-write passthrough.
    ///
    /// Propagates format changes, reads up to scratch length from the input
    /// (blocking up to the read timeout) and, if anything arrived, writes
    /// exactly that many bytes to the output. Returns the byte count.
    pub fn passthrough_step(&mut self) -> Result<usize> {
        self.take_format_change();
        let n = self.fill_from_input()?;
        if n == 0 {
            return Ok(0);
        }
        self.flush_to_output(n)
    }
}

impl std::fmt::Debug for ElementContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementContext")
            .field("tag", &self.tag)
            .field("status", &self.status.get())
            .field("has_input", &self.input.is_some())
            .field("has_output", &self.output.is_some())
            .field("scratch_len", &self.scratch.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::StreamFormat;

    fn ctx(input: Option<IoChannel>, output: Option<IoChannel>) -> ElementContext {
        ElementContext::new(
            "test".into(),
            input,
            output,
            64,
            Duration::from_millis(20),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn test_passthrough_moves_bytes() {
        let input = IoChannel::buffered(64);
        let output = IoChannel::buffered(64);
        let mut ctx = ctx(Some(input.clone()), Some(output.clone()));

        input.push(b"abcdef", Duration::from_millis(20)).unwrap();
        assert_eq!(ctx.passthrough_step().unwrap(), 6);

        let mut buf = [0u8; 16];
        assert_eq!(output.pop(&mut buf, Duration::from_millis(20)).unwrap(), 6);
        assert_eq!(&buf[..6], b"abcdef");
    }

    #[test]
    fn test_passthrough_propagates_format_once() {
        let input = IoChannel::buffered(64);
        let output = IoChannel::buffered(64);
        let mut ctx = ctx(Some(input.clone()), Some(output.clone()));

        input.format().update(StreamFormat::new(8_000, 1, 8));
        let _ = ctx.passthrough_step();
        let fmt = output.format().take_changed().expect("change propagated");
        assert_eq!(fmt.sample_rate, 8_000);
        let _ = ctx.passthrough_step();
        assert!(output.format().take_changed().is_none());
    }

    #[test]
    fn test_no_input_reads_nothing() {
        let mut ctx = ctx(None, Some(IoChannel::buffered(8)));
        assert_eq!(ctx.passthrough_step().unwrap(), 0);
    }

    #[test]
    fn test_full_output_is_an_error() {
        let input = IoChannel::buffered(64);
        let output = IoChannel::buffered(2);
        let mut ctx = ctx(Some(input.clone()), Some(output));

        input.push(b"abcdef", Duration::from_millis(20)).unwrap();
        // Two bytes fit, then the output jams with nobody draining.
        assert!(matches!(
            ctx.passthrough_step(),
            Err(Error::ChannelFull)
        ));
    }
}
