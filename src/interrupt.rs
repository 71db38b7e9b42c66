//! Host stand-in for the periodic audio interrupt: renders a block pair from a
//! source and pushes it into the channel queues, once per block period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio_block::{AudioBlock, Channel, AUDIO_BLOCK_SAMPLES};
use crate::sample_queue::StereoProducer;
use crate::source::AudioSource;

/// One firing of the audio interrupt. Owns the scratch blocks so firing never allocates.
pub struct AudioInterrupt<S: AudioSource> {
    source: S,
    producer: StereoProducer,
    left: AudioBlock,
    right: AudioBlock,
    fired: u64,
}

impl<S: AudioSource> AudioInterrupt<S> {
    pub fn new(source: S, producer: StereoProducer) -> Self {
        AudioInterrupt {
            source,
            producer,
            left: AudioBlock::new(Channel::Left),
            right: AudioBlock::new(Channel::Right),
            fired: 0,
        }
    }

    pub fn fire(&mut self) {
        self.source.receive(&mut self.left, &mut self.right);
        self.producer.push(&self.left, &self.right);
        self.fired += 1;
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }
}

/// Time between interrupts at `sample_rate_hz`.
pub fn block_period(sample_rate_hz: u32) -> Duration {
    Duration::from_secs_f64(AUDIO_BLOCK_SAMPLES as f64 / f64::from(sample_rate_hz.max(1)))
}

/// Background thread firing an `AudioInterrupt` at the block rate.
///
/// Deadlines are absolute, so a late wakeup is caught up on the next period
/// instead of slowly drifting.
pub struct BlockClock {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl BlockClock {
    pub fn spawn<S: AudioSource + 'static>(
        mut interrupt: AudioInterrupt<S>,
        sample_rate_hz: u32,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let period = block_period(sample_rate_hz);

        let handle = thread::spawn(move || {
            let mut deadline = Instant::now() + period;
            while flag.load(Ordering::Acquire) {
                let now = Instant::now();
                if now < deadline {
                    thread::sleep(deadline - now);
                }
                interrupt.fire();
                deadline += period;
            }
            interrupt.fired()
        });
        log::debug!("Block clock running, period={}us", period.as_micros());

        BlockClock {
            running,
            handle: Some(handle),
        }
    }

    /// Stops the thread and returns how many times it fired.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        self.running.store(false, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for BlockClock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_queue::sample_queue;
    use crate::source::SineSource;

    fn stereo(capacity: usize) -> (StereoProducer, crate::sample_queue::BlockConsumer, crate::sample_queue::BlockConsumer) {
        let (left_tx, left_rx) = sample_queue(capacity);
        let (right_tx, right_rx) = sample_queue(capacity);
        (
            StereoProducer {
                left: left_tx,
                right: right_tx,
            },
            left_rx,
            right_rx,
        )
    }

    #[test]
    /// Test that each firing queues one block per channel.
    fn test_fire_pushes_block_pair() {
        let (producer, mut left, mut right) = stereo(4);
        left.begin();
        right.begin();
        let mut irq = AudioInterrupt::new(SineSource::test_tone(44_100), producer);
        irq.fire();
        irq.fire();
        assert_eq!(irq.fired(), 2);
        assert_eq!(left.queued(), 2);
        assert_eq!(right.queued(), 2);
        assert_eq!(left.pop().unwrap().channel(), Channel::Left);
        assert_eq!(right.pop().unwrap().channel(), Channel::Right);
    }

    #[test]
    fn test_block_period_at_44k1() {
        let period = block_period(44_100);
        assert_eq!(period.as_micros(), 2902);
    }

    #[test]
    /// Test that the clock thread fires and stops cleanly.
    fn test_clock_fires_until_stopped() {
        let (producer, mut left, mut right) = stereo(64);
        left.begin();
        right.begin();
        let irq = AudioInterrupt::new(SineSource::test_tone(44_100), producer);
        let clock = BlockClock::spawn(irq, 44_100);
        thread::sleep(Duration::from_millis(30));
        let fired = clock.stop();
        assert!(fired > 0);
        assert_eq!(left.queued() as u64, fired.min(64));
    }
}
