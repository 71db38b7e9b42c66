//! Error types for the recorder, its configuration, and the host-side tools.

use std::io;

use thiserror::Error;

use crate::controller::RecordingState;

#[derive(Error, Debug)]
pub enum RecorderError {
    /// The storage medium could not be initialized. Not recoverable.
    #[error("storage device failed to mount: {0}")]
    Mount(#[source] io::Error),

    #[error("failed to open {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot {event} while {state}")]
    InvalidTransition {
        event: &'static str,
        state: RecordingState,
    },

    #[error("cannot do more than {} recordings", crate::sequence::MAX_RECORDINGS)]
    SessionLimit,

    #[error("cannot change {what} while recording")]
    Busy { what: &'static str },
}

impl RecorderError {
    /// Whether the system has no way to continue recording after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecorderError::Mount(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("failed to write config file: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported channel count {0} (expected 1 or 2)")]
    Channels(u16),
}

#[cfg(feature = "input")]
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no input device available")]
    NoInputDevice,

    #[error("no usable input config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("unsupported input sample format {0}")]
    Format(String),
}
