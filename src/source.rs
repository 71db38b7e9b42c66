//! Block sources: what fills the left/right blocks on every audio interrupt.

use std::f32::consts::PI;

use crate::audio_block::AudioBlock;

/// Something that renders one block per channel per interrupt.
///
/// Called from the interrupt context, so implementations must not block or allocate.
pub trait AudioSource: Send {
    fn receive(&mut self, left: &mut AudioBlock, right: &mut AudioBlock);
}

/// Sine oscillator. Phase is carried across blocks for continuity.
#[derive(Clone, Debug, PartialEq)]
pub struct SineGenerator {
    pub frequency_hz: f32,
    pub sample_rate: u32,
    pub amplitude: f32,
    /// Phase in [0.0, 1.0).
    pub phase: f32,
}

impl SineGenerator {
    pub fn new(frequency_hz: f32, sample_rate: u32) -> Self {
        Self {
            frequency_hz,
            sample_rate,
            amplitude: 1.0,
            phase: 0.0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn fill(&mut self, output: &mut [f32]) {
        let step = self.frequency_hz / self.sample_rate as f32;
        for sample in output.iter_mut() {
            *sample = self.amplitude * f32::sin(2.0 * PI * self.phase);
            self.phase = (self.phase + step) % 1.0;
        }
    }
}

/// Test tone: an independent sine on each channel.
#[derive(Clone, Debug)]
pub struct SineSource {
    left: SineGenerator,
    right: SineGenerator,
}

impl SineSource {
    pub fn new(left: SineGenerator, right: SineGenerator) -> Self {
        SineSource { left, right }
    }

    /// 440 Hz left, 660 Hz right, at half scale.
    pub fn test_tone(sample_rate: u32) -> Self {
        SineSource::new(
            SineGenerator::new(440.0, sample_rate).with_amplitude(0.5),
            SineGenerator::new(660.0, sample_rate).with_amplitude(0.5),
        )
    }
}

impl AudioSource for SineSource {
    fn receive(&mut self, left: &mut AudioBlock, right: &mut AudioBlock) {
        self.left.fill(left.as_mut_slice());
        self.right.fill(right.as_mut_slice());
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Silence;

impl AudioSource for Silence {
    fn receive(&mut self, left: &mut AudioBlock, right: &mut AudioBlock) {
        left.as_mut_slice().fill(0.0);
        right.as_mut_slice().fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_block::Channel;

    #[test]
    /// Test that the sine generator stays in range and is not silent.
    fn test_sine_generator_produces_sine_like_output() {
        let mut sine = SineGenerator::new(440.0, 48_000);
        let mut block = AudioBlock::new(Channel::Left);
        sine.fill(block.as_mut_slice());
        assert!(block.as_slice().iter().all(|&x| (-1.0..=1.0).contains(&x)));
        assert!(block.as_slice().iter().any(|&x| x != 0.0));
    }

    #[test]
    /// Test that phase carries over between blocks.
    fn test_sine_generator_phase_continuity() {
        let mut split = SineGenerator::new(1_000.0, 48_000);
        let mut whole = split.clone();

        let mut a = [0.0f32; 64];
        let mut b = [0.0f32; 64];
        split.fill(&mut a);
        split.fill(&mut b);

        let mut both = [0.0f32; 128];
        whole.fill(&mut both);
        assert_eq!(&both[..64], &a[..]);
        assert_eq!(&both[64..], &b[..]);
    }

    #[test]
    fn test_amplitude_scales_output() {
        let mut sine = SineGenerator::new(440.0, 48_000).with_amplitude(0.25);
        let mut buf = [0.0f32; 256];
        sine.fill(&mut buf);
        let max_abs = buf.iter().fold(0.0f32, |a, s| a.max(s.abs()));
        assert!(max_abs <= 0.25 && max_abs > 0.2, "got {max_abs}");
    }

    #[test]
    /// Test that the test tone fills both channels with different content.
    fn test_sine_source_fills_both_channels() {
        let mut source = SineSource::test_tone(44_100);
        let mut left = AudioBlock::new(Channel::Left);
        let mut right = AudioBlock::new(Channel::Right);
        source.receive(&mut left, &mut right);
        assert_ne!(left.as_slice(), right.as_slice());
    }

    #[test]
    fn test_silence_clears_blocks() {
        let mut left = AudioBlock::from_fn(Channel::Left, |_| 1.0);
        let mut right = AudioBlock::from_fn(Channel::Right, |_| -1.0);
        Silence.receive(&mut left, &mut right);
        assert!(left.as_slice().iter().chain(right.as_slice()).all(|&s| s == 0.0));
    }
}
