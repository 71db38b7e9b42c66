//! Recorder configuration, persisted as TOML.
//!
//! Default location is `<config dir>/sdrec/config.toml`
//! (`~/.config/sdrec/config.toml` on Linux). Command-line flags override it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aggregator::DEFAULT_WRITE_SIZE_BYTES;
use crate::convert::SampleFormat;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory standing in for the card root.
    pub output_dir: PathBuf,
    pub write_format: SampleFormat,
    /// Bytes accumulated before one physical write.
    pub write_size_bytes: usize,
    /// 1 writes only the left channel; 2 writes interleaved stereo.
    pub write_channels: u8,
    /// Block slots per channel queue.
    pub queue_capacity: usize,
    pub sample_rate_hz: u32,
    pub file_extension: String,
    /// Log the duration of every storage write.
    pub print_write_timing: bool,
    /// Write the trailing partial buffer when a recording stops instead of dropping it.
    pub flush_partial_on_stop: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            output_dir: PathBuf::from("."),
            write_format: SampleFormat::Int16,
            write_size_bytes: DEFAULT_WRITE_SIZE_BYTES,
            write_channels: 2,
            queue_capacity: 8,
            sample_rate_hz: 44_100,
            file_extension: "RAW".to_string(),
            print_write_timing: false,
            flush_partial_on_stop: false,
        }
    }
}

impl RecorderConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sdrec")
            .join("config.toml")
    }

    /// Loads `path`, writing the defaults there first if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: RecorderConfig = toml::from_str(&contents)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity < 2 {
            return Err(ConfigError::Invalid {
                field: "queue_capacity",
                reason: format!("{} is below the minimum of 2", self.queue_capacity),
            });
        }
        if !(1..=2).contains(&self.write_channels) {
            return Err(ConfigError::Invalid {
                field: "write_channels",
                reason: format!("{} is not 1 or 2", self.write_channels),
            });
        }
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_rate_hz",
                reason: "must be positive".to_string(),
            });
        }
        if self.write_size_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "write_size_bytes",
                reason: "must be positive".to_string(),
            });
        }
        let ext = &self.file_extension;
        if ext.is_empty() || ext.len() > 3 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Invalid {
                field: "file_extension",
                reason: format!("'{ext}' is not a 1-3 character 8.3 extension"),
            });
        }
        Ok(())
    }
}
