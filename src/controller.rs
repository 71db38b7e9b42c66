//! Recording state machine: gates when storage I/O may happen and drains the
//! sample queues into the writer once per scheduler tick.
//!
//! ```text
//! Unprepared --prepare--> Stopped --start--> Recording
//!                            ^                   |
//!                            +-------stop--------+
//! ```
//!
//! Any other event is rejected with a diagnostic and leaves the state unchanged.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::aggregator::SampleWriter;
use crate::config::RecorderConfig;
use crate::convert::SampleFormat;
use crate::error::{ConfigError, RecorderError};
use crate::sample_queue::{sample_queue, BlockConsumer, StereoProducer};
use crate::sequence::FileSequence;
use crate::storage::{StorageDevice, StorageSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    /// Storage has not been initialized yet.
    #[default]
    Unprepared,
    Stopped,
    Recording,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Unprepared => f.write_str("unprepared"),
            RecordingState::Stopped => f.write_str("stopped"),
            RecordingState::Recording => f.write_str("recording"),
        }
    }
}

/// Snapshot of the recorder for the status command.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderStatus {
    pub state: RecordingState,
    pub file: Option<String>,
    pub format: SampleFormat,
    pub write_channels: u8,
    pub write_size_bytes: usize,
    pub sample_rate_hz: u32,
    pub blocks_written: u64,
    pub bytes_written: u64,
    pub buffered_samples: usize,
    pub overrun: bool,
    pub started_at: Option<DateTime<Local>>,
    pub last_write: Option<Duration>,
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state={}", self.state)?;
        if let Some(file) = &self.file {
            write!(f, " file={file}")?;
        }
        write!(
            f,
            " format={} channels={} rate={}Hz write_size={}B blocks={} bytes={} buffered={} overrun={}",
            self.format,
            self.write_channels,
            self.sample_rate_hz,
            self.write_size_bytes,
            self.blocks_written,
            self.bytes_written,
            self.buffered_samples,
            self.overrun
        )?;
        if let Some(started_at) = self.started_at {
            let elapsed = Local::now().signed_duration_since(started_at);
            write!(
                f,
                " started={} elapsed={}s",
                started_at.format("%H:%M:%S"),
                elapsed.num_seconds()
            )?;
        }
        if let Some(last_write) = self.last_write {
            write!(f, " last_write={}us", last_write.as_micros())?;
        }
        Ok(())
    }
}

/// Owns the storage session, the writer and the consuming ends of both queues.
///
/// Everything here runs in the background context. The interrupt context only
/// ever sees the `StereoProducer` returned alongside it by `recording_pipeline`.
pub struct RecordingController<D: StorageDevice> {
    state: RecordingState,
    session: StorageSession<D>,
    writer: SampleWriter,
    left: BlockConsumer,
    right: BlockConsumer,
    sequence: FileSequence,
    write_channels: u8,
    sample_rate_hz: u32,
    flush_partial_on_stop: bool,
    current_file: Option<String>,
    started_at: Option<DateTime<Local>>,
}

/// Builds the controller and the matching interrupt-side queue handles.
///
/// `config` is validated first, so a queue smaller than two slots or an
/// unusable channel count is an error here rather than a panic later.
pub fn recording_pipeline<D: StorageDevice>(
    device: D,
    config: &RecorderConfig,
) -> Result<(RecordingController<D>, StereoProducer), ConfigError> {
    config.validate()?;
    let (left_tx, left_rx) = sample_queue(config.queue_capacity);
    let (right_tx, right_rx) = sample_queue(config.queue_capacity);

    let writer = SampleWriter::new(config.write_format, config.write_size_bytes);
    let mut session = StorageSession::new(device, writer.write_size_bytes());
    session.set_time_writes(config.print_write_timing);

    let controller = RecordingController {
        state: RecordingState::Unprepared,
        session,
        writer,
        left: left_rx,
        right: right_rx,
        sequence: FileSequence::new(config.file_extension.clone()),
        write_channels: config.write_channels,
        sample_rate_hz: config.sample_rate_hz,
        flush_partial_on_stop: config.flush_partial_on_stop,
        current_file: None,
        started_at: None,
    };
    let producer = StereoProducer {
        left: left_tx,
        right: right_tx,
    };
    Ok((controller, producer))
}

impl<D: StorageDevice> RecordingController<D> {
    /// Current state of the state machine.
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// One-time storage initialization. `Unprepared -> Stopped`.
    ///
    /// A mount failure leaves the state `Unprepared` and is fatal to the caller.
    pub fn prepare(&mut self) -> Result<(), RecorderError> {
        if self.state != RecordingState::Unprepared {
            return Err(self.reject("prepare"));
        }
        if let Err(err) = self.session.init() {
            log::error!("prepare: {err}");
            return Err(err);
        }
        self.state = RecordingState::Stopped;
        log::info!("Storage prepared for recording");
        Ok(())
    }

    /// Opens the next `RECORDnn` file and starts recording. `Stopped -> Recording`.
    ///
    /// Returns the file name. After 99 recordings this refuses and stays `Stopped`.
    pub fn start(&mut self) -> Result<String, RecorderError> {
        if self.state != RecordingState::Stopped {
            return Err(self.reject("start"));
        }
        let Some(name) = self.sequence.next_name() else {
            log::warn!("start: {}", RecorderError::SessionLimit);
            return Err(RecorderError::SessionLimit);
        };
        self.start_named(&name)?;
        Ok(name)
    }

    /// Starts recording into `name`, replacing any file already there.
    pub fn start_named(&mut self, name: &str) -> Result<(), RecorderError> {
        if self.state != RecordingState::Stopped {
            return Err(self.reject("start"));
        }
        if let Err(err) = self.session.open(name) {
            log::error!("start: {err}");
            return Err(err);
        }
        log::info!("Opened {name}");

        // A partial buffer from the previous take must not lead the new file.
        self.writer.discard_remainder();
        self.left.begin();
        self.right.begin();
        self.current_file = Some(name.to_string());
        self.started_at = Some(Local::now());
        self.state = RecordingState::Recording;
        Ok(())
    }

    /// Closes the file and stops both queues. `Recording -> Stopped`.
    ///
    /// Samples still short of a full write unit are dropped unless
    /// `flush_partial_on_stop` is set.
    pub fn stop(&mut self) -> Result<(), RecorderError> {
        if self.state != RecordingState::Recording {
            return Err(self.reject("stop"));
        }
        log::info!(
            "Closing {}...",
            self.current_file.as_deref().unwrap_or("recording")
        );
        if self.flush_partial_on_stop {
            self.writer.flush_remainder(&mut self.session);
        }
        self.session.close();
        self.state = RecordingState::Stopped;
        self.left.end();
        self.right.end();
        self.current_file = None;
        self.started_at = None;
        Ok(())
    }

    /// Moves queued audio to storage. Call once per scheduler tick.
    ///
    /// Never waits. Does nothing unless a file is open. Returns the number of
    /// blocks (stereo: block pairs) consumed.
    pub fn service(&mut self) -> usize {
        if !self.session.is_open() {
            return 0;
        }
        match self.write_channels {
            1 => self.service_one_channel(),
            _ => self.service_two_channels(),
        }
    }

    /// Stereo only advances when both channels have a block, so the
    /// interleaved stream never drifts out of alignment.
    fn service_two_channels(&mut self) -> usize {
        let mut blocks = 0;
        while self.left.available() && self.right.available() {
            let (Some(left), Some(right)) = (self.left.pop(), self.right.pop()) else {
                break;
            };
            self.writer
                .interleave_and_write(&mut self.session, left.as_slice(), right.as_slice());
            blocks += 1;
        }
        blocks
    }

    /// Writes the left channel and throws the right away so its queue cannot overrun.
    fn service_one_channel(&mut self) -> usize {
        let mut blocks = 0;
        while let Some(left) = self.left.pop() {
            self.writer.write_one_channel(&mut self.session, left.as_slice());
            blocks += 1;
        }
        while self.right.pop().is_some() {}
        blocks
    }

    /// Replaces the writer with one for `format`, keeping the write size in bytes.
    /// An active recording is stopped first.
    pub fn set_write_format(&mut self, format: SampleFormat) {
        if self.state == RecordingState::Recording {
            let _ = self.stop();
        }
        self.writer = SampleWriter::new(format, self.writer.write_size_bytes());
        self.session.set_write_granularity(self.writer.write_size_bytes());
    }

    /// Encoding of the file being written.
    pub fn write_format(&self) -> SampleFormat {
        self.writer.format()
    }

    /// Changes the write unit. Rejected while recording since the buffered samples would be lost.
    pub fn set_write_size_bytes(&mut self, bytes: usize) -> Result<(), RecorderError> {
        if self.state == RecordingState::Recording {
            return Err(self.busy("write size"));
        }
        self.writer.set_write_size_bytes(bytes);
        self.session.set_write_granularity(self.writer.write_size_bytes());
        Ok(())
    }

    /// Bytes per physical write.
    pub fn write_size_bytes(&self) -> usize {
        self.writer.write_size_bytes()
    }

    /// Sets how many channels go to the file, clamped to 1 or 2.
    pub fn set_write_channels(&mut self, channels: u8) -> Result<(), RecorderError> {
        if self.state == RecordingState::Recording {
            return Err(self.busy("write channels"));
        }
        self.write_channels = channels.clamp(1, 2);
        Ok(())
    }

    /// 1 for left only, 2 for interleaved stereo.
    pub fn write_channels(&self) -> u8 {
        self.write_channels
    }

    /// Whether either channel queue has dropped a block since the last clear.
    pub fn queue_overrun(&self) -> bool {
        self.left.overrun() || self.right.overrun()
    }

    /// Clears the overrun flag on both queues.
    pub fn clear_queue_overrun(&mut self) {
        self.left.clear_overrun();
        self.right.clear_overrun();
    }

    /// Warns about a dropped block, with roughly where in the recording it
    /// happened, then clears the flags. Returns whether there was anything to report.
    pub fn report_overrun(&mut self) -> bool {
        if !self.queue_overrun() {
            return false;
        }
        log::warn!(
            "SD write warning: there was a hiccup in the writing. Approx time (sec): {:.2}",
            self.recorded_seconds()
        );
        self.clear_queue_overrun();
        true
    }

    /// Audio time represented by the blocks written so far.
    pub fn recorded_seconds(&self) -> f64 {
        let frames_per_write =
            self.writer.write_size_samples() as f64 / f64::from(self.write_channels);
        self.session.blocks_written() as f64 * frames_per_write / f64::from(self.sample_rate_hz)
    }

    /// Physical writes issued since the last reset.
    pub fn blocks_written(&self) -> u64 {
        self.session.blocks_written()
    }

    /// Rate the incoming blocks were sampled at.
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Updates the rate used for time reporting, e.g. once a capture device
    /// reports the rate it actually runs at. Rejected while recording.
    pub fn set_sample_rate_hz(&mut self, rate_hz: u32) -> Result<(), RecorderError> {
        if self.state == RecordingState::Recording {
            return Err(self.busy("sample rate"));
        }
        if rate_hz != self.sample_rate_hz {
            log::info!("Sample rate {} Hz -> {rate_hz} Hz", self.sample_rate_hz);
        }
        self.sample_rate_hz = rate_hz.max(1);
        Ok(())
    }

    /// Zeroes the write counter used for overrun timing.
    pub fn reset_blocks_written(&mut self) {
        self.session.reset_blocks_written();
    }

    pub fn set_print_write_timing(&mut self, enabled: bool) {
        self.session.set_time_writes(enabled);
    }

    pub fn print_write_timing(&self) -> bool {
        self.session.time_writes()
    }

    pub fn is_file_open(&self) -> bool {
        self.session.is_open()
    }

    /// Name of the file being recorded, if any.
    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    /// Snapshot for the status command.
    pub fn status(&self) -> RecorderStatus {
        RecorderStatus {
            state: self.state,
            file: self.current_file.clone(),
            format: self.writer.format(),
            write_channels: self.write_channels,
            write_size_bytes: self.writer.write_size_bytes(),
            sample_rate_hz: self.sample_rate_hz,
            blocks_written: self.session.blocks_written(),
            bytes_written: self.session.bytes_written(),
            buffered_samples: self.writer.buffered_samples(),
            overrun: self.queue_overrun(),
            started_at: self.started_at,
            last_write: self.session.last_write_elapsed(),
        }
    }

    pub fn session(&self) -> &StorageSession<D> {
        &self.session
    }

    /// The storage device, for inspection after a run.
    pub fn device(&self) -> &D {
        self.session.device()
    }

    fn reject(&self, event: &'static str) -> RecorderError {
        log::warn!("{event}: not in correct state ({})", self.state);
        RecorderError::InvalidTransition {
            event,
            state: self.state,
        }
    }

    fn busy(&self, what: &'static str) -> RecorderError {
        log::warn!("cannot change {what} while recording");
        RecorderError::Busy { what }
    }
}

impl<D: StorageDevice> Drop for RecordingController<D> {
    fn drop(&mut self) {
        if self.state == RecordingState::Recording {
            let _ = self.stop();
        }
    }
}
