//! Stream format descriptors.
//!
//! Every [`IoChannel`](crate::io::IoChannel) carries a [`SharedFormat`]: the
//! upstream element writes it when the stream format changes (new file, codec
//! reconfiguration), the downstream element reads it at the start of a
//! processing step. A `changed` flag makes sure the consumer reacts exactly
//! once per change.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// PCM stream format plus stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u8,
    /// Bits per sample (8, 16, 24 or 32).
    pub bits_per_sample: u16,
    /// Current position in the stream, in bytes.
    pub byte_position: usize,
    /// Total length of the stream in bytes, 0 if unknown/unbounded.
    pub total_bytes: usize,
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            byte_position: 0,
            total_bytes: 0,
        }
    }
}

impl StreamFormat {
    /// Create a format with the given rate/channels/bit depth.
    pub fn new(sample_rate: u32, channels: u8, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            ..Self::default()
        }
    }

    /// Bytes used to encode one sample of this format.
    ///
    /// Anything wider than 16 bits is carried in 4 bytes.
    pub fn bytes_per_sample(&self) -> usize {
        crate::pcm::bytes_per_sample(self.bits_per_sample)
    }

    /// Bytes per interleaved frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Validate that the format is representable by the mixing arithmetic.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidFormat("sample rate is zero".into()));
        }
        if self.channels == 0 {
            return Err(Error::InvalidFormat("channel count is zero".into()));
        }
        match self.bits_per_sample {
            8 | 16 | 24 | 32 => Ok(()),
            other => Err(Error::InvalidFormat(format!(
                "unsupported bit depth: {other}"
            ))),
        }
    }
}

#[derive(Debug)]
struct FormatCell {
    format: StreamFormat,
    changed: bool,
}

/// Shared, change-tracked format descriptor.
///
/// Cloning shares the underlying cell. The lock is held only for the copy,
/// never across a blocking I/O call.
#[derive(Debug, Clone)]
pub struct SharedFormat {
    cell: Arc<Mutex<FormatCell>>,
}

impl Default for SharedFormat {
    fn default() -> Self {
        Self::new(StreamFormat::default())
    }
}

impl SharedFormat {
    /// Create a shared descriptor with the given initial format.
    ///
    /// The initial value does not count as a change.
    pub fn new(format: StreamFormat) -> Self {
        Self {
            cell: Arc::new(Mutex::new(FormatCell {
                format,
                changed: false,
            })),
        }
    }

    /// Get a copy of the current format.
    pub fn get(&self) -> StreamFormat {
        self.cell.lock().expect("format lock poisoned").format
    }

    /// Replace the format and raise the `changed` flag.
    pub fn update(&self, format: StreamFormat) {
        let mut cell = self.cell.lock().expect("format lock poisoned");
        cell.format = format;
        cell.changed = true;
    }

    /// Update only the stream position without signalling a format change.
    pub fn set_position(&self, byte_position: usize) {
        let mut cell = self.cell.lock().expect("format lock poisoned");
        cell.format.byte_position = byte_position;
    }

    /// If the format changed since the last call, clear the flag and return
    /// the new format.
    pub fn take_changed(&self) -> Option<StreamFormat> {
        let mut cell = self.cell.lock().expect("format lock poisoned");
        if cell.changed {
            cell.changed = false;
            Some(cell.format)
        } else {
            None
        }
    }
}
