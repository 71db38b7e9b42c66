//! SPSC (single producer, single consumer) ring buffer for lock-free hand-off
//! between the audio interrupt context and the background writer.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free SPSC ring buffer. One context may call `try_send`; another may call `try_recv`.
/// No allocation in send/recv; capacity fixed at creation.
///
/// Crate-private. `try_send` and `try_recv` are `unsafe`: the caller promises a
/// single producer and a single consumer. The public face is the handle pairs
/// in `sample_queue` and `command`, which take `&mut self` and are not `Clone`,
/// so safe code cannot attach a second writer or reader.
pub(crate) struct RingBuffer<T> {
    /// Slots (uninitialized until sent, then read by consumer)
    storage: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Capacity (storage.len()). Must be > 0.
    cap: usize,
    /// Producer index: next slot to write. Consumer never writes this.
    write_index: AtomicUsize,
    /// Consumer index: next slot to read. Producer never writes this.
    read_index: AtomicUsize,
}

// SAFETY: slots are only touched by the single producer (before publishing
// write_index) or the single consumer (before publishing read_index), so a
// slot is never accessed from two contexts at once.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Creates a ring buffer with the given capacity. No allocation after this.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        let storage: Box<[UnsafeCell<MaybeUninit<T>>]> = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        RingBuffer {
            storage,
            cap: capacity,
            write_index: AtomicUsize::new(0),
            read_index: AtomicUsize::new(0),
        }
    }

    /// Number of slots, fixed at creation.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Tries to send a value. Returns `Ok(())` if enqueued, `Err(value)` if full.
    ///
    /// # Safety
    ///
    /// No other thread may be inside `try_send` on this buffer at the same time.
    /// Concurrent calls from one consumer to `try_recv` are fine.
    pub unsafe fn try_send(&self, value: T) -> Result<(), T> {
        let read = self.read_index.load(Ordering::Acquire);
        let write = self.write_index.load(Ordering::Relaxed);

        // Full if number of items == cap.
        if write.wrapping_sub(read) == self.cap {
            return Err(value);
        }

        let index = write % self.cap;

        // SAFETY: only the producer writes this slot, and we only write
        // when the ring is not full, so we don't overwrite an unread value.
        unsafe {
            (*self.storage[index].get()).write(value);
        }

        self.write_index.store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Tries to receive a value. Returns `Some(value)` if one was enqueued, `None` if empty.
    ///
    /// # Safety
    ///
    /// No other thread may be inside `try_recv` on this buffer at the same time.
    /// Concurrent calls from one producer to `try_send` are fine.
    pub unsafe fn try_recv(&self) -> Option<T> {
        let read = self.read_index.load(Ordering::Relaxed);
        let write = self.write_index.load(Ordering::Acquire);

        // Empty if read_index == write_index.
        if read == write {
            return None;
        }

        let index = read % self.cap;

        // SAFETY: only the consumer reads this slot, and we only read
        // when the ring is not empty, so the slot holds an initialized value
        // which is moved out exactly once.
        let value = unsafe { (*self.storage[index].get()).assume_init_read() };

        self.read_index.store(read.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Number of values currently queued. A snapshot; may change immediately after.
    pub fn len(&self) -> usize {
        let write = self.write_index.load(Ordering::Acquire);
        let read = self.read_index.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Returns whether the buffer is empty (nothing to recv).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether the buffer is full (try_send would fail).
    pub fn is_full(&self) -> bool {
        self.len() == self.cap
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no producer or consumer is still running.
        while unsafe { self.try_recv() }.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::sync::Arc;
    use std::thread;

    use super::RingBuffer;

    // Tests drive the buffer from one thread, or from exactly one producer
    // thread and one consumer thread, which is the contract of both calls.
    fn send<T>(ring_buffer: &RingBuffer<T>, value: T) -> Result<(), T> {
        unsafe { ring_buffer.try_send(value) }
    }

    fn recv<T>(ring_buffer: &RingBuffer<T>) -> Option<T> {
        unsafe { ring_buffer.try_recv() }
    }

    #[test]
    /// Test that sending a value and then receiving it returns the value.
    fn test_send_then_recv_returns_value() {
        let ring_buffer: RingBuffer<i32> = RingBuffer::new(1);
        send(&ring_buffer, 42).unwrap();
        assert_eq!(recv(&ring_buffer), Some(42));
    }

    #[test]
    /// Test that receiving from an empty buffer returns None.
    fn test_empty_recv_returns_none() {
        let ring_buffer: RingBuffer<i32> = RingBuffer::new(1);
        assert_eq!(recv(&ring_buffer), None);
    }

    #[test]
    /// Test that sending a value to a full buffer returns Err.
    fn test_full_send_returns_err() {
        let ring_buffer: RingBuffer<i32> = RingBuffer::new(1);
        send(&ring_buffer, 42).unwrap();
        assert!(ring_buffer.is_full());
        assert_eq!(send(&ring_buffer, 43), Err(43));
    }

    #[test]
    /// Test that the values are received in the order they were sent, across wrap-around.
    fn test_fifo_order_with_wraparound() {
        let ring_buffer: RingBuffer<i32> = RingBuffer::new(3);
        for round in 0..4 {
            for i in 0..3 {
                send(&ring_buffer, round * 10 + i).unwrap();
            }
            assert_eq!(ring_buffer.len(), 3);
            for i in 0..3 {
                assert_eq!(recv(&ring_buffer), Some(round * 10 + i));
            }
            assert!(ring_buffer.is_empty());
        }
    }

    #[test]
    /// Test that values still queued are dropped with the buffer.
    fn test_drop_releases_queued_values() {
        let tracker = Rc::new(());
        {
            let ring_buffer = RingBuffer::new(4);
            send(&ring_buffer, tracker.clone()).unwrap();
            send(&ring_buffer, tracker.clone()).unwrap();
            assert_eq!(Rc::strong_count(&tracker), 3);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    /// Test that one producer thread and one consumer thread see every value exactly once, in order.
    fn test_threaded_spsc_preserves_sequence() {
        let ring_buffer = Arc::new(RingBuffer::<u32>::new(8));
        let producer = {
            let ring_buffer = ring_buffer.clone();
            thread::spawn(move || {
                let mut next = 0;
                while next < 10_000 {
                    if send(&*ring_buffer, next).is_ok() {
                        next += 1;
                    } else {
                        thread::yield_now();
                    }
                }
            })
        };

        let mut expected = 0;
        while expected < 10_000 {
            match recv(&*ring_buffer) {
                Some(value) => {
                    assert_eq!(value, expected);
                    expected += 1;
                }
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();
        assert!(ring_buffer.is_empty());
    }
}
