//! Archive status bookkeeping.
//!
//! Two managers run after every successful upload: one records the agent's
//! own "this segment is archived" markers, the other synchronises
//! PostgreSQL's `archive_status` directory by renaming `.ready` to `.done`.
//! Both degrade to no-ops when their directory cannot be used, so status
//! bookkeeping can never fail an archive operation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use walvault_common::Result;

/// Marker files recording segments this agent has confirmed archived.
pub enum ArchiveStatusManager {
    Disk { dir: PathBuf },
    Nop,
}

impl ArchiveStatusManager {
    /// Manager over a marker directory, created on demand. Falls back to a
    /// no-op when the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match std::fs::create_dir_all(&dir) {
            Ok(()) => Self::Disk { dir },
            Err(e) => {
                warn!("can't use archive status folder {dir:?}: {e}");
                Self::Nop
            }
        }
    }

    pub fn nop() -> Self {
        Self::Nop
    }

    pub async fn is_wal_already_uploaded(&self, wal_name: &str) -> bool {
        match self {
            Self::Disk { dir } => tokio::fs::metadata(dir.join(wal_name)).await.is_ok(),
            Self::Nop => false,
        }
    }

    pub async fn mark_wal_uploaded(&self, wal_name: &str) -> Result<()> {
        match self {
            Self::Disk { dir } => {
                tokio::fs::write(dir.join(wal_name), b"").await?;
                Ok(())
            }
            Self::Nop => Ok(()),
        }
    }

    pub async fn unmark_wal_uploaded(&self, wal_name: &str) -> Result<()> {
        match self {
            Self::Disk { dir } => {
                match tokio::fs::remove_file(dir.join(wal_name)).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Self::Nop => Ok(()),
        }
    }
}

/// Synchronises PostgreSQL's own `archive_status` directory.
pub enum PgArchiveStatusManager {
    Disk { dir: PathBuf },
    Nop,
}

impl PgArchiveStatusManager {
    /// Manager over an existing `archive_status` directory; a missing one
    /// (non-standard layouts, tests) degrades to a no-op.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if dir.is_dir() {
            Self::Disk { dir }
        } else {
            warn!("archive status directory {dir:?} does not exist, skipping sync");
            Self::Nop
        }
    }

    pub fn nop() -> Self {
        Self::Nop
    }

    /// Rename `<wal>.ready` to `<wal>.done`. A missing `.ready` file is
    /// fine: the database may have renamed it itself.
    pub async fn rename_ready_to_done(&self, wal_name: &str) -> Result<()> {
        let Self::Disk { dir } = self else {
            return Ok(());
        };
        let ready = dir.join(format!("{wal_name}.ready"));
        let done = dir.join(format!("{wal_name}.done"));
        match tokio::fs::rename(&ready, &done).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Path of PostgreSQL's archive status directory under a WAL directory.
pub fn pg_archive_status_dir(wal_dir: &Path) -> PathBuf {
    wal_dir.join("archive_status")
}

/// Path of the agent's own data folder under a WAL directory.
pub fn agent_data_dir(wal_dir: &Path) -> PathBuf {
    wal_dir.join("walvault_data")
}

/// Path of the agent's archive status marker folder.
pub fn agent_archive_status_dir(wal_dir: &Path) -> PathBuf {
    agent_data_dir(wal_dir).join("walvault_archive_status")
}
