//! Format conversion from floating-point audio to the on-disk sample representation,
//! and interleaving of two channels into one little-endian byte stream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Storage representation of each written sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit fixed point.
    #[default]
    Int16,
    /// IEEE 32-bit float, passed through unchanged.
    Float32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Int16 => i16::BYTES,
            SampleFormat::Float32 => f32::BYTES,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::Int16 => f.write_str("int16"),
            SampleFormat::Float32 => f.write_str("float32"),
        }
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int16" | "i16" => Ok(SampleFormat::Int16),
            "float32" | "f32" => Ok(SampleFormat::Float32),
            other => Err(format!("unknown sample format '{other}'")),
        }
    }
}

/// Quantizes one sample to 16-bit fixed point.
///
/// Truncates `sample * 32767` toward zero with no clamping: values outside
/// [-1.0, 1.0] wrap around in two's complement (1.5 becomes -16386).
#[inline]
pub fn quantize_i16(sample: f32) -> i16 {
    (sample * 32767.0) as i32 as i16
}

/// A sample type the writer can store.
pub trait StorageSample: Copy + Send + 'static {
    const BYTES: usize;
    const FORMAT: SampleFormat;

    fn from_f32(sample: f32) -> Self;

    /// Writes the little-endian encoding into `out[..Self::BYTES]`.
    fn write_le(self, out: &mut [u8]);

    /// Returns the input bytes unchanged when they already are this type's
    /// storage encoding, letting a full block skip the copy into the write buffer.
    fn passthrough_bytes(_samples: &[f32]) -> Option<&[u8]> {
        None
    }
}

impl StorageSample for i16 {
    const BYTES: usize = 2;
    const FORMAT: SampleFormat = SampleFormat::Int16;

    #[inline]
    fn from_f32(sample: f32) -> Self {
        quantize_i16(sample)
    }

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out[..2].copy_from_slice(&self.to_le_bytes());
    }
}

impl StorageSample for f32 {
    const BYTES: usize = 4;
    const FORMAT: SampleFormat = SampleFormat::Float32;

    #[inline]
    fn from_f32(sample: f32) -> Self {
        sample
    }

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_le_bytes());
    }

    #[cfg(target_endian = "little")]
    fn passthrough_bytes(samples: &[f32]) -> Option<&[u8]> {
        // SAFETY: f32 has no padding or invalid bit patterns, u8 has alignment 1,
        // and the byte length covers exactly the same memory.
        Some(unsafe {
            std::slice::from_raw_parts(samples.as_ptr().cast::<u8>(), std::mem::size_of_val(samples))
        })
    }
}

/// Converts `samples` into `out` as consecutive `S` values. Stops at whichever runs out first.
/// Returns the number of samples written.
pub fn encode_mono<S: StorageSample>(samples: &[f32], out: &mut [u8]) -> usize {
    let n = samples.len().min(out.len() / S::BYTES);
    for (sample, slot) in samples[..n].iter().zip(out.chunks_exact_mut(S::BYTES)) {
        S::from_f32(*sample).write_le(slot);
    }
    n
}

/// Interleaves `chan1` and `chan2` into `out` as `c1, c2, c1, c2, ...`.
///
/// Only whole frames are written. Returns the number of samples written
/// (twice the number of frames).
pub fn encode_interleaved<S: StorageSample>(chan1: &[f32], chan2: &[f32], out: &mut [u8]) -> usize {
    let frames = chan1.len().min(chan2.len()).min(out.len() / (2 * S::BYTES));
    for ((a, b), frame) in chan1[..frames]
        .iter()
        .zip(&chan2[..frames])
        .zip(out.chunks_exact_mut(2 * S::BYTES))
    {
        let (first, second) = frame.split_at_mut(S::BYTES);
        S::from_f32(*a).write_le(first);
        S::from_f32(*b).write_le(second);
    }
    2 * frames
}
