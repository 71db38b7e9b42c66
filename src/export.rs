//! Host-side conversion of a headerless recording into a WAV file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::convert::SampleFormat;
use crate::error::ExportError;

/// What a raw file contains. Nothing in the file itself records this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLayout {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
}

impl RawLayout {
    fn wav_spec(&self) -> hound::WavSpec {
        let (bits_per_sample, sample_format) = match self.format {
            SampleFormat::Int16 => (16, hound::SampleFormat::Int),
            SampleFormat::Float32 => (32, hound::SampleFormat::Float),
        };
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

/// Wraps the little-endian samples in `raw` as a WAV file at `wav`.
/// Returns the number of frames written. A trailing partial frame is padded with silence.
pub fn export_wav(raw: &Path, wav: &Path, layout: RawLayout) -> Result<u64, ExportError> {
    if !(1..=2).contains(&layout.channels) {
        return Err(ExportError::Channels(layout.channels));
    }
    let mut reader = BufReader::new(File::open(raw)?);
    let mut writer = hound::WavWriter::create(wav, layout.wav_spec())?;

    let sample_bytes = layout.format.bytes_per_sample();
    let mut buf = [0u8; 4096];
    let mut pending = Vec::with_capacity(sample_bytes);
    let mut samples = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            pending.push(byte);
            if pending.len() == sample_bytes {
                match layout.format {
                    SampleFormat::Int16 => {
                        writer.write_sample(i16::from_le_bytes([pending[0], pending[1]]))?
                    }
                    SampleFormat::Float32 => writer.write_sample(f32::from_le_bytes([
                        pending[0], pending[1], pending[2], pending[3],
                    ]))?,
                }
                pending.clear();
                samples += 1;
            }
        }
    }

    if !pending.is_empty() {
        log::warn!("{}: dropping {} stray byte(s)", raw.display(), pending.len());
    }
    let channels = u64::from(layout.channels);
    let stray = samples % channels;
    if stray != 0 {
        log::warn!("{}: padding trailing partial frame", raw.display());
        // hound rejects a data chunk that is not a whole number of frames.
        for _ in stray..channels {
            match layout.format {
                SampleFormat::Int16 => writer.write_sample(0i16)?,
                SampleFormat::Float32 => writer.write_sample(0.0f32)?,
            }
            samples += 1;
        }
    }
    let frames = samples / channels;
    writer.finalize()?;
    log::info!("Wrote {} ({frames} frames)", wav.display());
    Ok(frames)
}
