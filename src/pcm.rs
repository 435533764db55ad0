//! Integer PCM sample arithmetic.
//!
//! Pure functions used by the mixing engine: decode/encode of 1-4 byte
//! two's-complement samples, sample-and-hold upsampling, and additive
//! accumulation into a running output buffer.
//!
//! # Numeric semantics
//!
//! Samples are always signed. Decode reproduces the exact two's-complement
//! value for any byte width; encode is the exact inverse (mask to width,
//! low-to-high byte order for little-endian). Summation wraps on overflow,
//! it never saturates: the reference arithmetic wraps and several tests are
//! built against that behavior. Saturation would be a separate, deliberately
//! tested policy change.

/// Sample byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Least significant byte first (the pipeline default).
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

/// Bytes used to encode one sample of `bits` depth.
///
/// Anything wider than 16 bits is carried in 4 bytes, so 24-bit samples are
/// mixed at 4-byte width.
pub fn bytes_per_sample(bits: u16) -> usize {
    if bits > 16 {
        4
    } else {
        (bits / 8) as usize
    }
}

/// Decode a signed sample of `width` bytes starting at `offset`.
///
/// `width` must be 1-4 and `offset + width` must be inside `buf`.
pub fn decode_sample(buf: &[u8], offset: usize, width: usize, endian: Endianness) -> i32 {
    debug_assert!((1..=4).contains(&width));
    let mut raw: u32 = 0;
    match endian {
        Endianness::Big => {
            for i in 0..width {
                raw = (raw << 8) | buf[offset + i] as u32;
            }
        }
        Endianness::Little => {
            for i in (0..width).rev() {
                raw = (raw << 8) | buf[offset + i] as u32;
            }
        }
    }
    sign_extend(raw, width)
}

/// Encode a signed sample into `width` bytes starting at `offset`.
///
/// The value is masked to the width; the caller is responsible for staying
/// in range (the mixer deliberately lets sums wrap).
pub fn encode_sample(sample: i32, buf: &mut [u8], offset: usize, width: usize, endian: Endianness) {
    debug_assert!((1..=4).contains(&width));
    let mut raw = sample as u32 & width_mask(width);
    match endian {
        Endianness::Big => {
            for i in (0..width).rev() {
                buf[offset + i] = (raw & 0xff) as u8;
                raw >>= 8;
            }
        }
        Endianness::Little => {
            for i in 0..width {
                buf[offset + i] = (raw & 0xff) as u8;
                raw >>= 8;
            }
        }
    }
}

fn width_mask(width: usize) -> u32 {
    if width == 4 {
        u32::MAX
    } else {
        (1u32 << (8 * width)) - 1
    }
}

fn sign_extend(raw: u32, width: usize) -> i32 {
    if width == 4 {
        return raw as i32;
    }
    let bits = 8 * width;
    let sign = 1u32 << (bits - 1);
    if raw & sign != 0 {
        (raw | (u32::MAX << bits)) as i32
    } else {
        raw as i32
    }
}

/// Sample-and-hold upsampling.
///
/// Every input frame is repeated `target_rate / source_rate` times (integer
/// floor). This approximates the target rate without interpolating; for
/// non-integer ratios (e.g. 8000 -> 44100) the result runs short of the true
/// rate. Kept exactly like this: downstream byte-for-byte fixtures depend on
/// the repeat-previous-frame behavior.
///
/// Returns the input unchanged when the ratio is 1 or the source rate is
/// already at or above the target.
pub fn upsample(
    data: &[u8],
    source_rate: u32,
    frame_bytes: usize,
    target_rate: u32,
) -> Vec<u8> {
    debug_assert!(frame_bytes > 0);
    let rate_mult = (target_rate / source_rate) as usize;
    if rate_mult <= 1 {
        return data.to_vec();
    }

    let frame_count = data.len() / frame_bytes;
    let mut out = vec![0u8; frame_count * rate_mult * frame_bytes];
    for i in 0..frame_count * rate_mult {
        let src = (i / rate_mult) * frame_bytes;
        let dst = i * frame_bytes;
        out[dst..dst + frame_bytes].copy_from_slice(&data[src..src + frame_bytes]);
    }
    out
}

/// Add `src` samples into the running output buffer.
///
/// Each source sample is decoded at `src_width`, attenuated by `gain_shift`
/// (right shift, 0 = unity), added (wrapping) to the output sample decoded at
/// `out_width` from the same sample index, and re-encoded at `out_width`.
/// Because the operation is purely additive, source order does not matter and
/// a short `src` contributes up to its own length.
///
/// Returns the number of output-buffer bytes touched
/// (`samples_mixed * out_width`).
pub fn accumulate(
    out: &mut [u8],
    out_width: usize,
    src: &[u8],
    src_width: usize,
    gain_shift: u8,
    endian: Endianness,
) -> usize {
    let samples = (src.len() / src_width).min(out.len() / out_width);
    for j in 0..samples {
        let sample = decode_sample(src, j * src_width, src_width, endian) >> gain_shift;
        let current = decode_sample(out, j * out_width, out_width, endian);
        encode_sample(
            current.wrapping_add(sample),
            out,
            j * out_width,
            out_width,
            endian,
        );
    }
    samples * out_width
}
