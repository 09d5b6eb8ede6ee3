//! On-demand storage aliveness probes.
//!
//! A probe is a single bounded operation against a storage root: a listing
//! for read-only checks, a small write-then-delete for read-write checks.
//! Nothing here schedules anything; probes run only when routing asks.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use walvault_common::{Error, Result};
use walvault_storage::{content_from_bytes, Folder};

/// Probes one folder within a fixed timeout.
pub struct AliveProber {
    timeout: Duration,
    /// Size of the blob written by a read-write probe; `None` keeps the
    /// probe read-only
    write_size: Option<u64>,
}

impl AliveProber {
    pub fn read_only(timeout: Duration) -> Self {
        Self {
            timeout,
            write_size: None,
        }
    }

    pub fn read_write(timeout: Duration, write_size: u64) -> Self {
        Self {
            timeout,
            write_size: Some(write_size),
        }
    }

    /// Probe the storage root. `Ok` means alive; any error means dead.
    pub async fn probe(&self, name: &str, folder: &Arc<dyn Folder>) -> Result<()> {
        let outcome = tokio::time::timeout(self.timeout, self.probe_inner(folder))
            .await
            .unwrap_or(Err(Error::DeadlineExceeded));
        match &outcome {
            Ok(()) => debug!("storage {name} is alive"),
            Err(e) => warn!("storage {name} failed aliveness check: {e}"),
        }
        outcome
    }

    async fn probe_inner(&self, folder: &Arc<dyn Folder>) -> Result<()> {
        match self.write_size {
            None => {
                folder.list().await?;
                Ok(())
            }
            Some(size) => self.probe_write(folder, size).await,
        }
    }

    async fn probe_write(&self, folder: &Arc<dyn Folder>, size: u64) -> Result<()> {
        let name = format!("walvault_check_{}", Uuid::new_v4().simple());
        let blob = vec![0u8; size as usize];
        let deadline = Instant::now() + self.timeout;
        folder
            .put_with_deadline(deadline, &name, content_from_bytes(blob))
            .await?;

        // The write was the definitive test; a failed cleanup still counts
        // as alive.
        if let Err(e) = folder.delete(&[name.clone()]).await {
            warn!("failed to delete aliveness check object {name}: {e}");
        }
        Ok(())
    }
}
