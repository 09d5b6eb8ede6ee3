//! The on-disk half of the status cache.
//!
//! One JSON file shared between processes, guarded by advisory locks:
//! shared for reads, exclusive for writes, truncated to the new length
//! before every rewrite so no stale bytes survive a shrink.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::time::Instant;

use walvault_common::{Error, Result};

use super::key::StorageKey;
use super::status::{StatusMap, StorageStatus};

/// Inter-process status cache file.
pub struct SharedFile {
    path: PathBuf,
    /// When this process last rewrote the file; `None` until the first write
    written_at: Mutex<Option<Instant>>,
}

impl SharedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written_at: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Age of the on-disk mirror as maintained by this process.
    pub fn written_age(&self) -> Option<std::time::Duration> {
        self.written_at.lock().map(|t| t.elapsed())
    }

    /// Read and parse the whole file under a shared lock.
    pub fn read(&self) -> Result<StatusMap> {
        let mut file = File::open(&self.path)
            .map_err(|e| Error::CacheFile(format!("open {:?}: {e}", self.path)))?;
        lock_file(&file, false)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| Error::CacheFile(format!("read {:?}: {e}", self.path)))?;

        let parsed: BTreeMap<String, StorageStatus> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::CacheFile(format!("unmarshal {:?}: {e}", self.path)))?;
        Ok(parsed
            .into_iter()
            .map(|(key, status)| (StorageKey::parse(&key), status))
            .collect())
    }

    /// Rewrite the whole file under an exclusive lock.
    pub fn write(&self, content: &StatusMap) -> Result<()> {
        let keyed: BTreeMap<String, &StorageStatus> = content
            .iter()
            .map(|(key, status)| (key.to_string(), status))
            .collect();
        let bytes = serde_json::to_vec(&keyed)
            .map_err(|e| Error::CacheFile(format!("marshal cache content: {e}")))?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o666)
            .open(&self.path)
            .map_err(|e| Error::CacheFile(format!("open {:?}: {e}", self.path)))?;
        lock_file(&file, true)?;

        file.set_len(bytes.len() as u64)
            .map_err(|e| Error::CacheFile(format!("truncate {:?}: {e}", self.path)))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::CacheFile(format!("rewind {:?}: {e}", self.path)))?;
        file.write_all(&bytes)
            .map_err(|e| Error::CacheFile(format!("write {:?}: {e}", self.path)))?;

        *self.written_at.lock() = Some(Instant::now());
        Ok(())
    }
}

/// Advisory flock, retried while the syscall is interrupted by signals.
/// The lock is released when `file` is closed.
fn lock_file(file: &File, exclusive: bool) -> Result<()> {
    let how = if exclusive { libc::LOCK_EX } else { libc::LOCK_SH };
    loop {
        let rc = unsafe { libc::flock(file.as_raw_fd(), how) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(Error::CacheFile(format!("flock: {err}")));
        }
    }
}
