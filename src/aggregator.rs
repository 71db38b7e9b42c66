//! Write aggregation: accumulate converted samples until one storage-optimal write
//! unit is full, then hand it to the storage session in a single call.

use crate::convert::{self, SampleFormat, StorageSample};
use crate::storage::{StorageDevice, StorageSession};

/// 512 bytes is one SD sector, the most efficient write unit for the card.
pub const DEFAULT_WRITE_SIZE_BYTES: usize = 512;

/// Buffer of `write_size_samples` samples already encoded as little-endian `S`.
///
/// `write_size_samples` is always even and at least 2, so an interleaved stereo
/// stream always fills the buffer on a whole frame. The fill cursor never
/// exceeds the write size; reaching it triggers one flush and a reset to zero.
pub struct WriteAggregator<S: StorageSample> {
    buffer: Box<[u8]>,
    write_size_samples: usize,
    buffer_ind: usize,
    _sample: std::marker::PhantomData<S>,
}

impl<S: StorageSample> WriteAggregator<S> {
    /// Creates an empty aggregator with a `bytes`-sized write unit.
    pub fn with_write_size_bytes(bytes: usize) -> Self {
        let mut aggregator = WriteAggregator {
            buffer: Box::default(),
            write_size_samples: 0,
            buffer_ind: 0,
            _sample: std::marker::PhantomData,
        };
        aggregator.set_write_size_bytes(bytes);
        aggregator
    }

    /// Sets the write unit in bytes. See `set_write_size_samples`.
    pub fn set_write_size_bytes(&mut self, bytes: usize) {
        self.set_write_size_samples(bytes / S::BYTES);
    }

    /// Sets the write unit, rounded down to an even sample count of at least 2.
    ///
    /// Replaces the buffer and resets the cursor: anything buffered is lost.
    pub fn set_write_size_samples(&mut self, samples: usize) {
        self.write_size_samples = (2 * (samples / 2)).max(2);
        self.buffer = vec![0u8; self.write_size_samples * S::BYTES].into_boxed_slice();
        self.buffer_ind = 0;
    }

    /// Samples per physical write.
    pub fn write_size_samples(&self) -> usize {
        self.write_size_samples
    }

    /// Bytes per physical write, after rounding.
    pub fn write_size_bytes(&self) -> usize {
        self.write_size_samples * S::BYTES
    }

    /// Samples waiting in the buffer for the next flush.
    pub fn buffered_samples(&self) -> usize {
        self.buffer_ind
    }

    /// Interleaves `chan1` and `chan2` (`c1, c2, c1, c2, ...`) into the buffer,
    /// flushing each time it fills. Uses `min(chan1.len(), chan2.len())` frames.
    ///
    /// A remainder short of a full buffer stays buffered for the next call.
    /// Returns the number of flushes. Does nothing when no file is open.
    pub fn interleave_and_write<D: StorageDevice>(
        &mut self,
        session: &mut StorageSession<D>,
        chan1: &[f32],
        chan2: &[f32],
    ) -> usize {
        if !session.is_open() {
            return 0;
        }
        let frames = chan1.len().min(chan2.len());
        let mut flushes = 0;
        let mut frame = 0;
        while frame < frames {
            let room = self.write_size_samples - self.buffer_ind;
            if room == 1 {
                // A mono write left the cursor odd; this frame straddles the flush.
                flushes += self.push_sample(session, chan1[frame]);
                flushes += self.push_sample(session, chan2[frame]);
                frame += 1;
                continue;
            }
            let take = (room / 2).min(frames - frame);
            let start = self.buffer_ind * S::BYTES;
            self.buffer_ind += convert::encode_interleaved::<S>(
                &chan1[frame..frame + take],
                &chan2[frame..frame + take],
                &mut self.buffer[start..],
            );
            frame += take;
            flushes += self.flush_if_full(session);
        }
        flushes
    }

    /// Buffers a single channel, flushing each time the buffer fills.
    ///
    /// When the buffer is empty and `chan` is exactly one write unit whose bytes
    /// already match the storage encoding, it is written straight through.
    /// Returns the number of flushes. Does nothing when no file is open.
    pub fn write_one_channel<D: StorageDevice>(
        &mut self,
        session: &mut StorageSession<D>,
        chan: &[f32],
    ) -> usize {
        if !session.is_open() {
            return 0;
        }
        if self.buffer_ind == 0 && chan.len() == self.write_size_samples {
            if let Some(bytes) = S::passthrough_bytes(chan) {
                session.write(bytes);
                return 1;
            }
        }

        let mut flushes = 0;
        let mut rest = chan;
        while !rest.is_empty() {
            let start = self.buffer_ind * S::BYTES;
            let written = convert::encode_mono::<S>(rest, &mut self.buffer[start..]);
            self.buffer_ind += written;
            rest = &rest[written..];
            flushes += self.flush_if_full(session);
        }
        flushes
    }

    /// Writes whatever is buffered, even if short of a full unit. Returns bytes written.
    pub fn flush_remainder<D: StorageDevice>(&mut self, session: &mut StorageSession<D>) -> usize {
        if self.buffer_ind == 0 {
            return 0;
        }
        let written = session.write(&self.buffer[..self.buffer_ind * S::BYTES]);
        self.buffer_ind = 0;
        written
    }

    /// Drops anything buffered without writing it.
    pub fn discard_remainder(&mut self) {
        self.buffer_ind = 0;
    }

    fn push_sample<D: StorageDevice>(&mut self, session: &mut StorageSession<D>, sample: f32) -> usize {
        let start = self.buffer_ind * S::BYTES;
        S::from_f32(sample).write_le(&mut self.buffer[start..start + S::BYTES]);
        self.buffer_ind += 1;
        self.flush_if_full(session)
    }

    fn flush_if_full<D: StorageDevice>(&mut self, session: &mut StorageSession<D>) -> usize {
        if self.buffer_ind < self.write_size_samples {
            return 0;
        }
        session.write(&self.buffer);
        self.buffer_ind = 0;
        1
    }
}

/// Writer for the configured storage format, chosen once at setup.
pub enum SampleWriter {
    Int16(WriteAggregator<i16>),
    Float32(WriteAggregator<f32>),
}

impl SampleWriter {
    pub fn new(format: SampleFormat, write_size_bytes: usize) -> Self {
        match format {
            SampleFormat::Int16 => {
                SampleWriter::Int16(WriteAggregator::with_write_size_bytes(write_size_bytes))
            }
            SampleFormat::Float32 => {
                SampleWriter::Float32(WriteAggregator::with_write_size_bytes(write_size_bytes))
            }
        }
    }

    /// Storage encoding this writer produces.
    pub fn format(&self) -> SampleFormat {
        match self {
            SampleWriter::Int16(_) => SampleFormat::Int16,
            SampleWriter::Float32(_) => SampleFormat::Float32,
        }
    }

    /// See `WriteAggregator::set_write_size_bytes`.
    pub fn set_write_size_bytes(&mut self, bytes: usize) {
        match self {
            SampleWriter::Int16(w) => w.set_write_size_bytes(bytes),
            SampleWriter::Float32(w) => w.set_write_size_bytes(bytes),
        }
    }

    /// Bytes per physical write.
    pub fn write_size_bytes(&self) -> usize {
        match self {
            SampleWriter::Int16(w) => w.write_size_bytes(),
            SampleWriter::Float32(w) => w.write_size_bytes(),
        }
    }

    /// Samples per physical write.
    pub fn write_size_samples(&self) -> usize {
        match self {
            SampleWriter::Int16(w) => w.write_size_samples(),
            SampleWriter::Float32(w) => w.write_size_samples(),
        }
    }

    /// Samples waiting for the next flush.
    pub fn buffered_samples(&self) -> usize {
        match self {
            SampleWriter::Int16(w) => w.buffered_samples(),
            SampleWriter::Float32(w) => w.buffered_samples(),
        }
    }

    /// Returns the number of flushes.
    pub fn interleave_and_write<D: StorageDevice>(
        &mut self,
        session: &mut StorageSession<D>,
        chan1: &[f32],
        chan2: &[f32],
    ) -> usize {
        match self {
            SampleWriter::Int16(w) => w.interleave_and_write(session, chan1, chan2),
            SampleWriter::Float32(w) => w.interleave_and_write(session, chan1, chan2),
        }
    }

    /// Returns the number of flushes.
    pub fn write_one_channel<D: StorageDevice>(
        &mut self,
        session: &mut StorageSession<D>,
        chan: &[f32],
    ) -> usize {
        match self {
            SampleWriter::Int16(w) => w.write_one_channel(session, chan),
            SampleWriter::Float32(w) => w.write_one_channel(session, chan),
        }
    }

    /// Returns bytes written.
    pub fn flush_remainder<D: StorageDevice>(&mut self, session: &mut StorageSession<D>) -> usize {
        match self {
            SampleWriter::Int16(w) => w.flush_remainder(session),
            SampleWriter::Float32(w) => w.flush_remainder(session),
        }
    }

    /// Drops buffered samples without writing them.
    pub fn discard_remainder(&mut self) {
        match self {
            SampleWriter::Int16(w) => w.discard_remainder(),
            SampleWriter::Float32(w) => w.discard_remainder(),
        }
    }
}
