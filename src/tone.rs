//! Synthesized tone source.
//!
//! One waveform period is rendered once into a cycle buffer and replayed
//! until the requested duration's worth of frames has been emitted. The
//! producer runs as its own task driving a registered
//! [`SourceContext`](crate::registry::SourceContext), so it pauses, resumes
//! and stops like any other source.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::format::StreamFormat;
use crate::pcm::{encode_sample, Endianness};
use crate::registry::{SourceContext, SourceStatus};

/// Bounded wait per producer push. Long stalls are resolved by the status
/// check between attempts, not by the push itself.
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Tone shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    /// Pure sine.
    Sine,
    /// 50% duty-cycle square.
    Square,
}

/// What to synthesize.
#[derive(Debug, Clone, Copy)]
pub struct ToneSpec {
    /// Tone frequency in Hz.
    pub frequency_hz: u32,
    /// How long to play, in milliseconds.
    pub duration_ms: u64,
    /// Tone shape.
    pub waveform: Waveform,
    /// Peak amplitude as a fraction of full scale, clamped to `0.0..=1.0`.
    pub amplitude: f32,
}

impl ToneSpec {
    /// Sine tone at full scale.
    pub fn sine(frequency_hz: u32, duration_ms: u64) -> Self {
        Self {
            frequency_hz,
            duration_ms,
            waveform: Waveform::Sine,
            amplitude: 1.0,
        }
    }

    /// Square tone at full scale.
    pub fn square(frequency_hz: u32, duration_ms: u64) -> Self {
        Self {
            frequency_hz,
            duration_ms,
            waveform: Waveform::Square,
            amplitude: 1.0,
        }
    }

    /// Set the peak amplitude.
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    fn validate(&self, format: &StreamFormat) -> Result<()> {
        format.validate()?;
        if self.frequency_hz == 0 {
            return Err(Error::InvalidFormat("tone frequency is zero".into()));
        }
        if self.frequency_hz > format.sample_rate / 2 {
            return Err(Error::InvalidFormat(format!(
                "tone frequency {} above Nyquist for rate {}",
                self.frequency_hz, format.sample_rate
            )));
        }
        Ok(())
    }
}

/// Render one waveform period as interleaved PCM in `format`.
///
/// The period length is `sample_rate / frequency` frames (integer floor), so
/// replaying the buffer end-to-end reproduces the tone with at most one
/// frame of phase error per period.
pub fn render_cycle(spec: &ToneSpec, format: &StreamFormat) -> Result<Vec<u8>> {
    spec.validate(format)?;

    let frames = (format.sample_rate / spec.frequency_hz).max(1) as usize;
    let width = format.bytes_per_sample();
    let frame_bytes = format.bytes_per_frame();
    let amplitude = spec.amplitude.clamp(0.0, 1.0) as f64;
    let full_scale = ((1i64 << (format.bits_per_sample - 1)) - 1) as f64;
    let peak = full_scale * amplitude;

    let mut out = vec![0u8; frames * frame_bytes];
    for i in 0..frames {
        let value = match spec.waveform {
            Waveform::Sine => {
                let phase = i as f64 / frames as f64;
                (peak * (2.0 * std::f64::consts::PI * phase).sin()) as i64
            }
            Waveform::Square => {
                if i < frames / 2 {
                    peak as i64
                } else {
                    -(peak as i64)
                }
            }
        };
        for ch in 0..format.channels as usize {
            encode_sample(
                value as i32,
                &mut out,
                i * frame_bytes + ch * width,
                width,
                Endianness::Little,
            );
        }
    }
    Ok(out)
}

/// Start a producer task replaying the tone into `source`.
///
/// The task binds itself as the source's producer (so resume unparks it),
/// goes `Playing`, honors `Paused`/`Stopped`, and marks the source `Stopped`
/// once the duration is exhausted. Fails upfront on an unsupported format or
/// frequency.
pub fn spawn_tone(source: Arc<SourceContext>, spec: ToneSpec) -> Result<JoinHandle<()>> {
    let format = source.channel().format().get();
    let cycle = render_cycle(&spec, &format)?;
    let total_bytes =
        (format.sample_rate as u64 * spec.duration_ms / 1000) as usize * format.bytes_per_frame();

    let handle = thread::Builder::new()
        .name(format!("tone-{}", source.name()))
        .spawn(move || {
            source.bind_producer();
            source.set_status(SourceStatus::Playing);
            tracing::debug!(
                name = %source.name(),
                freq = spec.frequency_hz,
                ms = spec.duration_ms,
                total_bytes,
                "tone started"
            );

            let mut emitted = 0usize;
            'emit: while emitted < total_bytes {
                source.wait_while_paused();
                if source.status() == SourceStatus::Stopped {
                    break;
                }

                let chunk = cycle.len().min(total_bytes - emitted);
                let mut offset = 0;
                while offset < chunk {
                    match source.write(&cycle[offset..chunk], WRITE_TIMEOUT) {
                        Ok(n) => {
                            offset += n;
                            emitted += n;
                        }
                        Err(Error::ChannelFull) => {
                            // Consumer is behind; re-check control state and
                            // try again.
                            if source.status() == SourceStatus::Stopped {
                                break 'emit;
                            }
                            source.wait_while_paused();
                        }
                        Err(Error::Closed) => {
                            tracing::debug!(name = %source.name(), "channel closed, tone ending");
                            break 'emit;
                        }
                        Err(e) => {
                            tracing::warn!(name = %source.name(), error = %e, "tone write failed");
                            break 'emit;
                        }
                    }
                }
            }

            source.set_status(SourceStatus::Stopped);
            tracing::debug!(name = %source.name(), emitted, "tone finished");
        })
        .map_err(Error::Io)?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::decode_sample;
    use crate::registry::{SourceKind, SourceRegistry};

    #[test]
    fn test_cycle_length_is_one_period() {
        let format = StreamFormat::new(44_100, 2, 16);
        let cycle = render_cycle(&ToneSpec::sine(441, 100), &format).unwrap();
        // 44100 / 441 = 100 frames of 4 bytes.
        assert_eq!(cycle.len(), 100 * 4);
    }

    #[test]
    fn test_square_wave_values() {
        let format = StreamFormat::new(8_000, 1, 16);
        let cycle = render_cycle(
            &ToneSpec::square(1_000, 10).with_amplitude(0.5),
            &format,
        )
        .unwrap();
        // 8 frames: 4 high, 4 low, at half scale.
        assert_eq!(cycle.len(), 8 * 2);
        let peak = (i16::MAX as f64 * 0.5) as i64 as i32;
        for j in 0..4 {
            assert_eq!(decode_sample(&cycle, j * 2, 2, Endianness::Little), peak);
        }
        for j in 4..8 {
            assert_eq!(decode_sample(&cycle, j * 2, 2, Endianness::Little), -peak);
        }
    }

    #[test]
    fn test_sine_starts_at_zero_crossing() {
        let format = StreamFormat::new(8_000, 1, 16);
        let cycle = render_cycle(&ToneSpec::sine(1_000, 10), &format).unwrap();
        assert_eq!(decode_sample(&cycle, 0, 2, Endianness::Little), 0);
        // Quarter period is the positive peak.
        let quarter = decode_sample(&cycle, 2 * 2, 2, Endianness::Little);
        assert!(quarter > i16::MAX as i32 - 2, "quarter sample: {quarter}");
    }

    #[test]
    fn test_channels_carry_identical_samples() {
        let format = StreamFormat::new(8_000, 2, 16);
        let cycle = render_cycle(&ToneSpec::square(1_000, 10), &format).unwrap();
        for frame in 0..8 {
            let left = decode_sample(&cycle, frame * 4, 2, Endianness::Little);
            let right = decode_sample(&cycle, frame * 4 + 2, 2, Endianness::Little);
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_unsupported_depth_rejected() {
        let format = StreamFormat::new(8_000, 1, 12);
        assert!(matches!(
            render_cycle(&ToneSpec::sine(440, 10), &format),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_frequency_above_nyquist_rejected() {
        let format = StreamFormat::new(8_000, 1, 16);
        assert!(matches!(
            render_cycle(&ToneSpec::sine(5_000, 10), &format),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_producer_emits_exact_duration() {
        let format = StreamFormat::new(8_000, 1, 16);
        let reg = SourceRegistry::new();
        let source = reg
            .register(SourceKind::Tone, "beeper", 512, format)
            .unwrap();

        let producer = spawn_tone(Arc::clone(&source), ToneSpec::sine(1_000, 50)).unwrap();

        // 8000 Hz * 0.05 s * 2 bytes.
        let expected = 800usize;
        let mut drained = 0;
        let mut buf = [0u8; 256];
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while drained < expected && std::time::Instant::now() < deadline {
            drained += source
                .channel()
                .pop(&mut buf, Duration::from_millis(50))
                .unwrap();
        }
        assert_eq!(drained, expected);
        producer.join().unwrap();
        assert_eq!(source.status(), SourceStatus::Stopped);
    }
}
