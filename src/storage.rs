//! Storage: the block-device seam and the session that owns the open recording file.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::RecorderError;

/// Primitive operations the recorder needs from a storage device.
///
/// A device holds at most one open file. `write` appends to it.
pub trait StorageDevice {
    /// One-time initialization of the medium.
    fn mount(&mut self) -> io::Result<()>;
    fn exists(&self, name: &str) -> bool;
    fn remove(&mut self, name: &str) -> io::Result<()>;
    /// Creates (or truncates) `name` for read/write and makes it the open file.
    fn open(&mut self, name: &str) -> io::Result<()>;
    /// Appends `bytes` to the open file, returning how many were written.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;
    /// Flushes and releases the open file. Closing with nothing open is not an error.
    fn close(&mut self) -> io::Result<()>;
    fn is_open(&self) -> bool;
}

/// Device backed by a directory on the host file system.
#[derive(Debug)]
pub struct FsDevice {
    root: PathBuf,
    file: Option<File>,
}

impl FsDevice {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsDevice {
            root: root.into(),
            file: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl StorageDevice for FsDevice {
    fn mount(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        if !fs::metadata(&self.root)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is not a directory", self.root.display()),
            ));
        }
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    fn remove(&mut self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path(name))
    }

    fn open(&mut self, name: &str) -> io::Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path(name))?;
        self.file = Some(file);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(bytes)?;
                Ok(bytes.len())
            }
            None => Ok(0),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(mut file) => {
                file.flush()?;
                file.sync_all()
            }
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

/// In-memory device. Keeps every file's bytes and a log of individual writes;
/// used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemDevice {
    mounted: bool,
    fail_mount: bool,
    fail_open: bool,
    files: BTreeMap<String, Vec<u8>>,
    open: Option<String>,
    writes: Vec<Vec<u8>>,
    removed: Vec<String>,
}

impl MemDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device whose `mount` always fails, like a missing card.
    pub fn unmountable() -> Self {
        MemDevice {
            fail_mount: true,
            ..Self::default()
        }
    }

    /// Makes subsequent `open` calls fail (a full or busy medium).
    pub fn set_fail_open(&mut self, fail: bool) {
        self.fail_open = fail;
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Every write issued so far, in order, across all files.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Names passed to `remove`, in order.
    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    pub fn total_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

impl StorageDevice for MemDevice {
    fn mount(&mut self) -> io::Result<()> {
        if self.fail_mount {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no card present"));
        }
        self.mounted = true;
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn remove(&mut self, name: &str) -> io::Result<()> {
        self.removed.push(name.to_string());
        self.files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }

    fn open(&mut self, name: &str) -> io::Result<()> {
        if !self.mounted {
            return Err(io::Error::new(io::ErrorKind::Other, "device not mounted"));
        }
        if self.fail_open {
            return Err(io::Error::new(io::ErrorKind::Other, "device full"));
        }
        self.files.insert(name.to_string(), Vec::new());
        self.open = Some(name.to_string());
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let Some(name) = self.open.as_ref() else {
            return Ok(0);
        };
        if let Some(file) = self.files.get_mut(name) {
            file.extend_from_slice(bytes);
        }
        self.writes.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

/// Owns the device and the single open recording file.
///
/// Counts one block per `write` call, and optionally times each write. The file
/// is closed when the session is dropped.
pub struct StorageSession<D: StorageDevice> {
    device: D,
    blocks_written: u64,
    bytes_written: u64,
    write_granularity: usize,
    time_writes: bool,
    last_write_elapsed: Option<Duration>,
}

impl<D: StorageDevice> StorageSession<D> {
    pub fn new(device: D, write_granularity: usize) -> Self {
        StorageSession {
            device,
            blocks_written: 0,
            bytes_written: 0,
            write_granularity,
            time_writes: false,
            last_write_elapsed: None,
        }
    }

    /// Mounts the device. There is no recovery from a failure here; callers treat it as fatal.
    pub fn init(&mut self) -> Result<(), RecorderError> {
        self.device.mount().map_err(RecorderError::Mount)
    }

    /// Opens `name` for a fresh recording, removing any existing file of that
    /// name first so data is never appended to an old take.
    pub fn open(&mut self, name: &str) -> Result<(), RecorderError> {
        if self.device.is_open() {
            self.close();
        }
        if self.device.exists(name) {
            if let Err(err) = self.device.remove(name) {
                log::warn!("Could not remove existing {name}: {err}");
            }
        }
        self.device.open(name).map_err(|source| RecorderError::Open {
            name: name.to_string(),
            source,
        })?;
        Ok(())
    }

    /// Appends `bytes` to the open file. With no file open this does nothing and returns 0.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        if !self.device.is_open() {
            return 0;
        }
        let started = self.time_writes.then(Instant::now);
        let written = match self.device.write(bytes) {
            Ok(n) => n,
            Err(err) => {
                log::error!("Storage write of {} bytes failed: {err}", bytes.len());
                return 0;
            }
        };
        self.blocks_written += 1;
        self.bytes_written += written as u64;
        if let Some(started) = started {
            let elapsed = started.elapsed();
            self.last_write_elapsed = Some(elapsed);
            log::info!("SD, us={}", elapsed.as_micros());
        }
        written
    }

    /// Flushes and releases the file. Safe to call when nothing is open.
    pub fn close(&mut self) {
        if !self.device.is_open() {
            return;
        }
        if let Err(err) = self.device.close() {
            log::error!("Closing recording failed: {err}");
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_open()
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn reset_blocks_written(&mut self) {
        self.blocks_written = 0;
        self.bytes_written = 0;
    }

    pub fn write_granularity(&self) -> usize {
        self.write_granularity
    }

    pub fn set_write_granularity(&mut self, bytes: usize) {
        self.write_granularity = bytes;
    }

    pub fn set_time_writes(&mut self, enabled: bool) {
        self.time_writes = enabled;
        if !enabled {
            self.last_write_elapsed = None;
        }
    }

    pub fn time_writes(&self) -> bool {
        self.time_writes
    }

    /// Duration of the most recent write, when write timing is enabled.
    pub fn last_write_elapsed(&self) -> Option<Duration> {
        self.last_write_elapsed
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: StorageDevice> Drop for StorageSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}
