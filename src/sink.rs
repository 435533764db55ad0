//! The playback hardware boundary.
//!
//! The mixing engine talks to its output device through [`AudioSink`]; the
//! actual device driver (I2S, ALSA, a network peer) lives behind the trait.
//! [`NullSink`] discards everything, [`CaptureSink`] records everything and
//! exists for tests.

use std::sync::Mutex;

use crate::error::Result;

/// A playback device the mixer writes interleaved PCM into.
pub trait AudioSink: Send + Sync {
    /// Write a block of interleaved PCM bytes. Blocking; returns the number
    /// of bytes accepted.
    fn write(&self, pcm: &[u8]) -> Result<usize>;

    /// Drop whatever the device has queued. Used when the stream goes idle
    /// so stale audio is not replayed on resume.
    fn clear(&self) -> Result<()>;

    /// Reconfigure the device clock. Called only when the rate changes.
    fn set_sample_rate(&self, hz: u32) -> Result<()>;
}

/// Sink that accepts and discards all audio.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&self, pcm: &[u8]) -> Result<usize> {
        Ok(pcm.len())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn set_sample_rate(&self, _hz: u32) -> Result<()> {
        Ok(())
    }
}

/// Test sink that records every interaction.
#[derive(Debug, Default)]
pub struct CaptureSink {
    inner: Mutex<Capture>,
}

#[derive(Debug, Default)]
struct Capture {
    written: Vec<u8>,
    clears: usize,
    rates: Vec<u32>,
}

impl CaptureSink {
    /// Empty capture sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All bytes written so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().expect("capture sink poisoned").written.clone()
    }

    /// Total bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.inner.lock().expect("capture sink poisoned").written.len()
    }

    /// How many times `clear` was called.
    pub fn clears(&self) -> usize {
        self.inner.lock().expect("capture sink poisoned").clears
    }

    /// Every sample rate the mixer configured, in order.
    pub fn rates(&self) -> Vec<u32> {
        self.inner.lock().expect("capture sink poisoned").rates.clone()
    }
}

impl AudioSink for CaptureSink {
    fn write(&self, pcm: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().expect("capture sink poisoned");
        inner.written.extend_from_slice(pcm);
        Ok(pcm.len())
    }

    fn clear(&self) -> Result<()> {
        self.inner.lock().expect("capture sink poisoned").clears += 1;
        Ok(())
    }

    fn set_sample_rate(&self, hz: u32) -> Result<()> {
        self.inner.lock().expect("capture sink poisoned").rates.push(hz);
        Ok(())
    }
}
