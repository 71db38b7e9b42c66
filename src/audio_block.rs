//! Fixed-size audio block handed from the interrupt context to the background writer.
//! Plain data with no heap storage, so it can be copied into a queue slot without allocating.

/// Samples per channel per interrupt firing.
pub const AUDIO_BLOCK_SAMPLES: usize = 128;

/// Which input channel a block was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Left,
    Right,
}

/// One channel's worth of samples for one audio block period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioBlock {
    channel: Channel,
    samples: [f32; AUDIO_BLOCK_SAMPLES],
}

impl AudioBlock {
    /// Creates a zeroed block tagged with `channel`.
    pub const fn new(channel: Channel) -> Self {
        AudioBlock {
            channel,
            samples: [0.0; AUDIO_BLOCK_SAMPLES],
        }
    }

    /// Creates a block whose sample `i` is `f(i)`.
    pub fn from_fn(channel: Channel, mut f: impl FnMut(usize) -> f32) -> Self {
        let mut block = AudioBlock::new(channel);
        for (i, sample) in block.samples.iter_mut().enumerate() {
            *sample = f(i);
        }
        block
    }

    /// Which channel the block was captured on.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Number of samples in the block. Always `AUDIO_BLOCK_SAMPLES`.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; blocks are never empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mutable view for the producer to fill.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// The samples, oldest first.
    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioBlock, Channel, AUDIO_BLOCK_SAMPLES};

    #[test]
    /// Test that a new block has the system block length and is silent.
    fn test_new_block_is_zeroed_with_block_length() {
        let block = AudioBlock::new(Channel::Left);
        assert_eq!(block.len(), AUDIO_BLOCK_SAMPLES);
        assert!(block.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    /// Test that the channel tag is preserved.
    fn test_channel_tag() {
        assert_eq!(AudioBlock::new(Channel::Right).channel(), Channel::Right);
    }

    #[test]
    /// Test that writes through the mutable slice are visible in the immutable slice.
    fn test_as_mut_slice_writes_visible_in_as_slice() {
        let mut block = AudioBlock::new(Channel::Left);
        block.as_mut_slice()[5] = 0.25;
        assert_eq!(block.as_slice()[5], 0.25);
    }

    #[test]
    fn test_from_fn_fills_by_index() {
        let block = AudioBlock::from_fn(Channel::Left, |i| i as f32);
        assert_eq!(block.as_slice()[0], 0.0);
        assert_eq!(block.as_slice()[AUDIO_BLOCK_SAMPLES - 1], (AUDIO_BLOCK_SAMPLES - 1) as f32);
    }
}
