//! File-backed source stage.
//!
//! Reads raw PCM from a file and streams it downstream. The file boundary is
//! plain synchronous open/read/close; the element's own thread absorbs the
//! blocking. Header parsing and filesystem mounting live outside this crate;
//! the path handed in must point at raw sample data.

use std::fs::File;
use std::io::Read;

use crate::element::{ElementContext, ElementOps, OpenParams, Status};
use crate::error::{Error, Result};
use crate::format::StreamFormat;

/// Streams a raw PCM file to the output channel.
///
/// Opened with [`OpenParams::target`] carrying the path. At end of file the
/// element parks itself in `Paused` instead of stopping, reporting the final
/// byte position downstream; the task stays controllable so the stream can
/// be torn down (or repurposed) from outside.
pub struct FileSource {
    format: StreamFormat,
    file: Option<File>,
    bytes_read: usize,
}

impl FileSource {
    /// Source announcing `format` for the bytes it streams.
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            file: None,
            bytes_read: 0,
        }
    }
}

impl ElementOps for FileSource {
    fn open(&mut self, ctx: &mut ElementContext, params: &OpenParams) -> Result<()> {
        let path = params.target.as_deref().ok_or_else(|| {
            Error::ResourceUnavailable("file source needs a path".into())
        })?;
        self.format.validate()?;

        let file = File::open(path).map_err(|e| {
            Error::ResourceUnavailable(format!("cannot open '{path}': {e}"))
        })?;
        let mut format = self.format;
        format.total_bytes = file.metadata().map(|m| m.len() as usize).unwrap_or(0);

        if let Some(output) = ctx.output() {
            output.format().update(format);
        }
        self.format = format;
        self.bytes_read = 0;
        self.file = Some(file);
        tracing::debug!(tag = %ctx.tag(), path, total = format.total_bytes, "file opened");
        Ok(())
    }

    fn process(&mut self, ctx: &mut ElementContext) -> Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };

        let n = file.read(ctx.scratch())?;
        if n == 0 {
            // End of file: report the final position and park. The file is
            // released; control messages still reach the task.
            tracing::debug!(tag = %ctx.tag(), bytes = self.bytes_read, "end of file");
            self.file = None;
            if let Some(output) = ctx.output() {
                output.format().set_position(self.bytes_read);
            }
            ctx.set_status(Status::Paused);
            return Ok(0);
        }

        let written = ctx.flush_to_output(n)?;
        self.bytes_read += written;
        if let Some(output) = ctx.output() {
            output.format().set_position(self.bytes_read);
        }
        Ok(written)
    }

    fn close(&mut self, _ctx: &mut ElementContext) -> Result<()> {
        self.file = None;
        Ok(())
    }
}
