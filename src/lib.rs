//! sdrec: buffered multi-channel recording to block storage.
//!
//! The audio interrupt pushes fixed blocks into per-channel `sample_queue`s; the
//! background loop drives a `RecordingController`, which drains the queues,
//! converts and interleaves samples in a `WriteAggregator`, and hands complete
//! write units to a `StorageSession`.

pub mod aggregator;
pub mod audio_block;
pub mod command;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod export;
pub mod interrupt;
mod ring_buffer;
pub mod sample_queue;
pub mod sequence;
pub mod source;
pub mod storage;

#[cfg(feature = "input")]
pub mod capture;

pub use controller::{recording_pipeline, RecordingController, RecordingState};
pub use error::RecorderError;
