//! Live input: the default capture device plays the role of the audio interrupt.
//!
//! The cpal callback hands over interleaved frames of arbitrary length; a
//! `BlockAssembler` slices them into fixed blocks and pushes each completed pair.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use crate::audio_block::{AudioBlock, Channel, AUDIO_BLOCK_SAMPLES};
use crate::error::CaptureError;
use crate::sample_queue::StereoProducer;

/// Deinterleaves callback frames into block pairs.
///
/// Mono input is duplicated to both channels; channels past the second are ignored.
pub struct BlockAssembler {
    producer: StereoProducer,
    channels: usize,
    left: AudioBlock,
    right: AudioBlock,
    fill: usize,
}

impl BlockAssembler {
    /// `channels` is the interleaved frame width of the incoming data.
    pub fn new(producer: StereoProducer, channels: u16) -> Self {
        BlockAssembler {
            producer,
            channels: usize::from(channels.max(1)),
            left: AudioBlock::new(Channel::Left),
            right: AudioBlock::new(Channel::Right),
            fill: 0,
        }
    }

    /// Returns the number of block pairs completed.
    pub fn push_interleaved<T>(&mut self, data: &[T]) -> usize
    where
        T: Sample,
        f32: FromSample<T>,
    {
        let mut completed = 0;
        for frame in data.chunks_exact(self.channels) {
            let l = frame[0].to_sample::<f32>();
            let r = frame.get(1).map_or(l, |s| s.to_sample::<f32>());
            self.left.as_mut_slice()[self.fill] = l;
            self.right.as_mut_slice()[self.fill] = r;
            self.fill += 1;
            if self.fill == AUDIO_BLOCK_SAMPLES {
                self.producer.push(&self.left, &self.right);
                self.fill = 0;
                completed += 1;
            }
        }
        completed
    }
}

/// A running input stream. Capture stops when this is dropped.
pub struct InputCapture {
    _stream: cpal::Stream,
    channels: u16,
    sample_rate_hz: u32,
}

impl InputCapture {
    /// Channel count the device delivers per frame.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Rate the device actually runs at. Blocks arrive at this rate.
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }
}

/// Picks the rate recordings are made at: the device's, since blocks are not resampled.
pub fn effective_sample_rate(configured_hz: u32, device_hz: u32) -> u32 {
    if configured_hz != device_hz {
        log::warn!(
            "Input device runs at {device_hz} Hz, not the configured {configured_hz} Hz; \
             recording at {device_hz} Hz"
        );
    }
    device_hz
}

/// Opens the default input device and starts feeding `producer`.
///
/// The stream runs at the device's default rate; `configured_hz` is only
/// compared against it. Read the result from `InputCapture::sample_rate_hz`.
pub fn open_input_stream(
    producer: StereoProducer,
    configured_hz: u32,
) -> Result<InputCapture, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;
    let supported = device.default_input_config()?;
    let sample_format = supported.sample_format();
    let channels = supported.channels();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate_hz = effective_sample_rate(configured_hz, config.sample_rate);
    log::info!("Input stream: {channels} channel(s), {sample_format:?}, {sample_rate_hz} Hz");

    let assembler = BlockAssembler::new(producer, channels);
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, assembler)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, assembler)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, assembler)?,
        other => return Err(CaptureError::Format(format!("{other:?}"))),
    };
    stream.play()?;

    Ok(InputCapture {
        _stream: stream,
        channels,
        sample_rate_hz,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut assembler: BlockAssembler,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let err_fn = |err: cpal::StreamError| log::error!("an error occurred on the input stream: {err}");
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            assembler.push_interleaved(data);
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_queue::{sample_queue, BlockConsumer};

    fn assembler(channels: u16) -> (BlockAssembler, BlockConsumer, BlockConsumer) {
        let (left_tx, mut left_rx) = sample_queue(4);
        let (right_tx, mut right_rx) = sample_queue(4);
        left_rx.begin();
        right_rx.begin();
        let producer = StereoProducer {
            left: left_tx,
            right: right_tx,
        };
        (BlockAssembler::new(producer, channels), left_rx, right_rx)
    }

    #[test]
    /// Test that stereo frames split into matching left and right blocks across callbacks.
    fn test_stereo_frames_deinterleave() {
        let (mut asm, mut left, mut right) = assembler(2);
        let frames: Vec<f32> = (0..AUDIO_BLOCK_SAMPLES)
            .flat_map(|i| [i as f32, -(i as f32)])
            .collect();
        let (first, second) = frames.split_at(100);
        assert_eq!(asm.push_interleaved(first), 0);
        assert_eq!(asm.push_interleaved(second), 1);

        let l = left.pop().unwrap();
        let r = right.pop().unwrap();
        assert_eq!(l.as_slice()[7], 7.0);
        assert_eq!(r.as_slice()[7], -7.0);
        assert!(left.pop().is_none());
    }

    #[test]
    fn test_mono_input_duplicated() {
        let (mut asm, mut left, mut right) = assembler(1);
        let frames = vec![0.5f32; AUDIO_BLOCK_SAMPLES];
        asm.push_interleaved(&frames);
        assert_eq!(left.pop().unwrap().as_slice(), right.pop().unwrap().as_slice());
    }

    #[test]
    /// Test that the device rate wins over the configured one.
    fn test_effective_sample_rate_follows_device() {
        assert_eq!(effective_sample_rate(44_100, 48_000), 48_000);
        assert_eq!(effective_sample_rate(44_100, 44_100), 44_100);
    }

    #[test]
    /// Test that integer input is scaled to the [-1, 1) float range.
    fn test_i16_input_converted() {
        let (mut asm, mut left, _right) = assembler(2);
        let frames: Vec<i16> = (0..AUDIO_BLOCK_SAMPLES).flat_map(|_| [i16::MIN, 0]).collect();
        asm.push_interleaved(&frames);
        assert_eq!(left.pop().unwrap().as_slice()[0], -1.0);
    }
}
