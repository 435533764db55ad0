//! Multi-source mixing engine.
//!
//! The mixer is an element with fan-in: instead of one input channel it
//! drains every `Playing` source in the [`SourceRegistry`], normalizes rates
//! and widths, sums the samples, and pushes the mix to an [`AudioSink`]
//! and/or its output channel.
//!
//! One processing step is one mix cycle:
//!
//! 1. snapshot the `Playing` sources; none ⇒ clear the sink, idle sleep
//! 2. widest bit depth ⇒ output width, highest rate ⇒ target rate
//!    (reconfigure the sink clock only on change)
//! 3. per source: bounded pop, sample-and-hold upsample below the target
//!    rate, additive accumulate with the gain shift
//! 4. hand exactly the widest contribution downstream, zero the used region
//!
//! Everything inside the cycle is absorb-and-log: a stalled source
//! contributes nothing, a failed write costs one cycle of audio. Mixing is
//! order-independent because accumulation is purely additive.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use smallvec::SmallVec;

use crate::element::{ElementContext, ElementOps};
use crate::error::{Error, Result};
use crate::format::StreamFormat;
use crate::pcm::{self, Endianness};
use crate::registry::{SourceKind, SourceRegistry, SourceStatus, MAX_SOURCES};
use crate::sink::AudioSink;

/// Default mix buffer length in bytes.
pub const DEFAULT_MIX_BUFFER_LEN: usize = 4096;
/// Default bounded wait per source pop. Short: a stalled source must not
/// starve the whole cycle.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_millis(10);
/// Default sleep when no source is playing.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(100);

/// The mixing element. Plug into an [`Element`](crate::element::Element)
/// without an input channel; the registry is its fan-in.
pub struct Mixer {
    registry: Arc<SourceRegistry>,
    sink: Option<Arc<dyn AudioSink>>,
    /// Running output buffer; `[..used]` is zeroed after every cycle.
    mix: Vec<u8>,
    read_buf: Vec<u8>,
    /// Sub-frame tail bytes left over from unaligned reads, per source.
    carries: SmallVec<[(SourceKind, SmallVec<[u8; 16]>); MAX_SOURCES]>,
    gain_shift: u8,
    endianness: Endianness,
    source_timeout: Duration,
    idle_sleep: Duration,
    /// Last (rate, bits, channels) pushed downstream, to reconfigure once
    /// per change.
    current: Option<(u32, u16, u8)>,
}

impl Mixer {
    /// Mixer over `registry` with default tuning and no sink.
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            sink: None,
            mix: vec![0u8; DEFAULT_MIX_BUFFER_LEN],
            read_buf: vec![0u8; DEFAULT_MIX_BUFFER_LEN],
            carries: SmallVec::new(),
            gain_shift: 0,
            endianness: Endianness::default(),
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            idle_sleep: DEFAULT_IDLE_SLEEP,
            current: None,
        }
    }

    /// Attach the playback device.
    pub fn with_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the per-source attenuation (right shift; 0 = unity, 1 = half).
    pub fn with_gain_shift(mut self, shift: u8) -> Self {
        self.gain_shift = shift;
        self
    }

    /// Set the mix buffer length in bytes.
    pub fn with_buffer_len(mut self, len: usize) -> Self {
        assert!(len > 0, "mix buffer must be non-empty");
        self.mix = vec![0u8; len];
        self.read_buf = vec![0u8; len];
        self
    }

    /// Set the bounded wait per source pop.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Set the idle sleep used when nothing is playing.
    pub fn with_idle_sleep(mut self, idle: Duration) -> Self {
        self.idle_sleep = idle;
        self
    }

    /// Set the sample byte order.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Clear the sink and pause the cycle. Used when there is nothing to mix
    /// so stale device audio is not replayed and the loop does not spin.
    fn go_idle(&self, tag: &str) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.clear() {
                tracing::warn!(%tag, error = %e, "sink clear failed");
            }
        }
        thread::sleep(self.idle_sleep);
    }

    fn carry_for(&mut self, kind: SourceKind) -> &mut SmallVec<[u8; 16]> {
        if let Some(idx) = self.carries.iter().position(|(k, _)| *k == kind) {
            return &mut self.carries[idx].1;
        }
        self.carries.push((kind, SmallVec::new()));
        &mut self.carries.last_mut().unwrap().1
    }

    /// Reconfigure the sink clock and downstream format, only on change.
    fn apply_format(
        &mut self,
        ctx: &ElementContext,
        rate: u32,
        bits: u16,
        channels: u8,
    ) {
        if self.current == Some((rate, bits, channels)) {
            return;
        }
        let rate_changed = self.current.map(|(r, _, _)| r) != Some(rate);
        self.current = Some((rate, bits, channels));
        tracing::debug!(tag = %ctx.tag(), rate, bits, channels, "mix format");

        if rate_changed {
            if let Some(sink) = &self.sink {
                if let Err(e) = sink.set_sample_rate(rate) {
                    tracing::warn!(tag = %ctx.tag(), rate, error = %e, "sink rate change failed");
                }
            }
        }
        if let Some(output) = ctx.output() {
            output.format().update(StreamFormat::new(rate, channels, bits));
        }
    }
}

impl ElementOps for Mixer {
    fn process(&mut self, ctx: &mut ElementContext) -> Result<usize> {
        let active = self.registry.all_with_status(SourceStatus::Playing);
        if active.is_empty() {
            self.go_idle(ctx.tag());
            return Ok(0);
        }

        // Widest stream wins: mix at the largest width, run at the highest
        // rate, so no active source loses precision or speed.
        let mut max_bits = 0u16;
        let mut target_rate = 0u32;
        let mut channels = 1u8;
        let mut formats: SmallVec<[StreamFormat; MAX_SOURCES]> = SmallVec::new();
        for source in &active {
            let fmt = source.channel().format().get();
            max_bits = max_bits.max(fmt.bits_per_sample);
            target_rate = target_rate.max(fmt.sample_rate);
            channels = channels.max(fmt.channels);
            formats.push(fmt);
        }
        let out_width = pcm::bytes_per_sample(max_bits);
        if out_width == 0 || target_rate == 0 {
            tracing::warn!(tag = %ctx.tag(), max_bits, target_rate, "unusable source formats");
            self.go_idle(ctx.tag());
            return Ok(0);
        }
        self.apply_format(ctx, target_rate, max_bits, channels);

        let mut max_bytes_mixed = 0usize;
        for (source, fmt) in active.iter().zip(&formats) {
            let src_width = pcm::bytes_per_sample(fmt.bits_per_sample);
            let frame = src_width * fmt.channels.max(1) as usize;
            if src_width == 0 || fmt.sample_rate == 0 {
                continue;
            }
            let rate_mult = ((target_rate / fmt.sample_rate) as usize).max(1);

            // Bound the read so the upsampled, width-promoted result still
            // fits the mix buffer.
            let mut cap = self
                .read_buf
                .len()
                .min(self.mix.len() / out_width * src_width / rate_mult);
            cap -= cap % frame;
            if cap == 0 {
                continue;
            }

            // Prepend any sub-frame tail from the previous cycle.
            let pending = std::mem::take(self.carry_for(source.kind()));
            self.read_buf[..pending.len()].copy_from_slice(&pending);
            let lead = pending.len();

            let got = match source.channel().pop(&mut self.read_buf[lead..cap], self.source_timeout)
            {
                Ok(n) => n,
                Err(Error::Closed) => {
                    tracing::debug!(tag = %ctx.tag(), source = source.kind().as_str(),
                        "source channel closed, stopping it");
                    source.set_status(SourceStatus::Stopped);
                    0
                }
                Err(e) => {
                    tracing::warn!(tag = %ctx.tag(), source = source.kind().as_str(),
                        error = %e, "source read failed");
                    0
                }
            };
            let total = lead + got;
            let usable = total - total % frame;
            if usable < total {
                let tail: SmallVec<[u8; 16]> = SmallVec::from_slice(&self.read_buf[usable..total]);
                *self.carry_for(source.kind()) = tail;
            }
            if usable == 0 {
                continue;
            }

            let mixed = if rate_mult > 1 {
                let held =
                    pcm::upsample(&self.read_buf[..usable], fmt.sample_rate, frame, target_rate);
                pcm::accumulate(
                    &mut self.mix,
                    out_width,
                    &held,
                    src_width,
                    self.gain_shift,
                    self.endianness,
                )
            } else {
                pcm::accumulate(
                    &mut self.mix,
                    out_width,
                    &self.read_buf[..usable],
                    src_width,
                    self.gain_shift,
                    self.endianness,
                )
            };
            max_bytes_mixed = max_bytes_mixed.max(mixed);
        }

        if max_bytes_mixed == 0 {
            // Every active source came up empty this cycle.
            self.go_idle(ctx.tag());
            return Ok(0);
        }

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write(&self.mix[..max_bytes_mixed]) {
                tracing::warn!(tag = %ctx.tag(), error = %e, "sink write failed, dropping cycle");
            }
        }
        if let Some(output) = ctx.output() {
            let mut written = 0;
            while written < max_bytes_mixed {
                match output.push(&self.mix[written..max_bytes_mixed], ctx.read_timeout()) {
                    Ok(0) | Err(Error::ChannelFull) => {
                        tracing::warn!(tag = %ctx.tag(), dropped = max_bytes_mixed - written,
                            "output full, dropping rest of cycle");
                        break;
                    }
                    Ok(n) => written += n,
                    Err(e) => {
                        tracing::warn!(tag = %ctx.tag(), error = %e, "output write failed");
                        break;
                    }
                }
            }
        }

        // No leakage into the next cycle.
        self.mix[..max_bytes_mixed].fill(0);
        Ok(max_bytes_mixed)
    }
}
