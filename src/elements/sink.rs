//! Terminal sink stage.

use std::sync::Arc;

use crate::element::{ElementContext, ElementOps};
use crate::error::Result;
use crate::sink::AudioSink;

/// Drains the input channel into an [`AudioSink`]. No output channel.
///
/// Format changes on the input are forwarded as sink clock reconfigurations.
pub struct SinkElement {
    sink: Arc<dyn AudioSink>,
}

impl SinkElement {
    /// Sink stage writing into `sink`.
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self { sink }
    }
}

impl ElementOps for SinkElement {
    fn process(&mut self, ctx: &mut ElementContext) -> Result<usize> {
        if let Some(fmt) = ctx.take_format_change() {
            self.sink.set_sample_rate(fmt.sample_rate)?;
        }
        let n = ctx.fill_from_input()?;
        if n == 0 {
            return Ok(0);
        }
        let mut written = 0;
        while written < n {
            written += self.sink.write(&ctx.scratch()[written..n])?;
        }
        Ok(n)
    }
}
