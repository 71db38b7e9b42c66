//! SampleQueue: per-channel hand-off of completed audio blocks from the interrupt
//! context to the background writer.
//!
//! `sample_queue` returns exactly one `BlockProducer` and one `BlockConsumer`. Neither
//! is `Clone` and every operation takes `&mut self`, so a second writer or reader
//! cannot be attached to the same queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio_block::AudioBlock;
use crate::ring_buffer::RingBuffer;

struct Shared {
    ring: RingBuffer<AudioBlock>,
    active: AtomicBool,
    overrun: AtomicBool,
}

/// Interrupt side of a SampleQueue. Only the audio interrupt should hold this.
pub struct BlockProducer {
    shared: Arc<Shared>,
}

impl BlockProducer {
    /// Copies `block` into the next free slot.
    ///
    /// Dropped silently while the queue is inactive. If every slot is full the
    /// block is dropped and the sticky overrun flag is set. Never blocks or allocates.
    /// Returns whether the block was queued.
    pub fn push(&mut self, block: &AudioBlock) -> bool {
        if !self.shared.active.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: the only producer handle, borrowed mutably.
        match unsafe { self.shared.ring.try_send(*block) } {
            Ok(()) => true,
            Err(_) => {
                self.shared.overrun.store(true, Ordering::Release);
                false
            }
        }
    }
}

/// Background side of a SampleQueue. Owned by the recording controller.
pub struct BlockConsumer {
    shared: Arc<Shared>,
}

impl BlockConsumer {
    /// Starts accepting pushes and clears the overrun flag.
    /// Blocks left over from an earlier session are discarded first.
    pub fn begin(&mut self) {
        // SAFETY: the only consumer handle, borrowed mutably.
        while unsafe { self.shared.ring.try_recv() }.is_some() {}
        self.shared.overrun.store(false, Ordering::Release);
        self.shared.active.store(true, Ordering::Release);
    }

    /// Stops accepting pushes. Blocks already queued stay until popped.
    pub fn end(&mut self) {
        self.shared.active.store(false, Ordering::Release);
    }

    /// Whether pushes are currently accepted.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Whether at least one filled slot is waiting.
    pub fn available(&self) -> bool {
        !self.shared.ring.is_empty()
    }

    /// Number of filled slots right now.
    pub fn queued(&self) -> usize {
        self.shared.ring.len()
    }

    /// Slot count, fixed at creation.
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Takes the oldest queued block and frees its slot.
    pub fn pop(&mut self) -> Option<AudioBlock> {
        // SAFETY: as in `begin`.
        unsafe { self.shared.ring.try_recv() }
    }

    /// Whether a push has been dropped for lack of space since the last clear.
    pub fn overrun(&self) -> bool {
        self.shared.overrun.load(Ordering::Acquire)
    }

    /// Resets the overrun flag without touching queued blocks.
    pub fn clear_overrun(&mut self) {
        self.shared.overrun.store(false, Ordering::Release);
    }
}

/// Creates a SampleQueue with `capacity` block slots, inactive until `begin`.
///
/// # Panics
///
/// Panics if `capacity` is below 2. `RecorderConfig::validate` rejects such
/// configs before `recording_pipeline` gets here.
pub fn sample_queue(capacity: usize) -> (BlockProducer, BlockConsumer) {
    assert!(capacity >= 2, "sample queue needs at least 2 slots");
    let shared = Arc::new(Shared {
        ring: RingBuffer::new(capacity),
        active: AtomicBool::new(false),
        overrun: AtomicBool::new(false),
    });
    (
        BlockProducer {
            shared: shared.clone(),
        },
        BlockConsumer { shared },
    )
}

/// Interrupt-side handles for both channels, pushed together once per firing.
pub struct StereoProducer {
    pub left: BlockProducer,
    pub right: BlockProducer,
}

impl StereoProducer {
    /// Pushes one block to each channel. Either may be dropped on overrun.
    pub fn push(&mut self, left: &AudioBlock, right: &AudioBlock) {
        self.left.push(left);
        self.right.push(right);
    }
}

#[cfg(test)]
mod tests {
    use super::sample_queue;
    use crate::audio_block::{AudioBlock, Channel};

    fn block(value: f32) -> AudioBlock {
        AudioBlock::from_fn(Channel::Left, |_| value)
    }

    #[test]
    /// Test that pushes before begin are dropped without flagging overrun.
    fn test_inactive_queue_drops_silently() {
        let (mut tx, rx) = sample_queue(4);
        assert!(!tx.push(&block(1.0)));
        assert!(!rx.available());
        assert!(!rx.overrun());
    }

    #[test]
    /// Test that blocks come out in the order they were pushed, exactly once.
    fn test_fifo_order_no_duplication() {
        let (mut tx, mut rx) = sample_queue(4);
        rx.begin();
        for v in 0..4 {
            assert!(tx.push(&block(v as f32)));
        }
        for v in 0..4 {
            assert_eq!(rx.pop().unwrap().as_slice()[0], v as f32);
        }
        assert!(rx.pop().is_none());
    }

    #[test]
    /// Test that a producer thread and the consumer hand over every block once, in order.
    fn test_cross_thread_handoff() {
        const BLOCKS: usize = 5_000;
        let (mut tx, mut rx) = sample_queue(2);
        rx.begin();
        let interrupt = std::thread::spawn(move || {
            for v in 0..BLOCKS {
                while !tx.push(&block(v as f32)) {
                    std::thread::yield_now();
                }
            }
        });

        let mut next = 0;
        while next < BLOCKS {
            match rx.pop() {
                Some(b) => {
                    assert!(b.as_slice().iter().all(|s| *s == next as f32));
                    next += 1;
                }
                None => std::thread::yield_now(),
            }
        }
        interrupt.join().unwrap();
        assert!(rx.pop().is_none());
    }

    #[test]
    /// Test that a push into a full queue drops the block and the flag stays set.
    fn test_overrun_is_sticky() {
        let (mut tx, mut rx) = sample_queue(2);
        rx.begin();
        assert!(tx.push(&block(1.0)));
        assert!(tx.push(&block(2.0)));
        assert!(!tx.push(&block(3.0)));
        assert!(rx.overrun());

        assert_eq!(rx.pop().unwrap().as_slice()[0], 1.0);
        assert!(tx.push(&block(4.0)));
        assert!(rx.overrun(), "overrun must not clear on a later successful push");

        assert_eq!(rx.pop().unwrap().as_slice()[0], 2.0);
        assert_eq!(rx.pop().unwrap().as_slice()[0], 4.0);

        rx.clear_overrun();
        assert!(!rx.overrun());
    }

    #[test]
    /// Test that end stops new pushes but keeps what was already queued.
    fn test_end_keeps_queued_blocks() {
        let (mut tx, mut rx) = sample_queue(4);
        rx.begin();
        tx.push(&block(1.0));
        rx.end();
        assert!(!tx.push(&block(2.0)));
        assert_eq!(rx.queued(), 1);
        assert_eq!(rx.pop().unwrap().as_slice()[0], 1.0);
    }

    #[test]
    /// Test that begin discards stale blocks and clears the overrun flag.
    fn test_begin_resets_queue() {
        let (mut tx, mut rx) = sample_queue(2);
        rx.begin();
        tx.push(&block(1.0));
        tx.push(&block(2.0));
        tx.push(&block(3.0));
        rx.end();

        rx.begin();
        assert!(rx.is_active());
        assert!(!rx.available());
        assert!(!rx.overrun());
    }

    #[test]
    #[should_panic]
    fn test_capacity_below_two_rejected() {
        let _ = sample_queue(1);
    }
}
