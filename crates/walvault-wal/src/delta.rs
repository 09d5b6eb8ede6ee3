//! Block-delta artifacts for consecutive WAL segments.
//!
//! The manager keeps the previously archived segment image in the agent's
//! data folder. When the next segment has the same size, only the 8 KiB
//! blocks that changed are emitted as a delta artifact alongside the full
//! segment. Any filesystem error disables the delta path for the rest of the
//! daemon's lifetime; straight segments continue unaffected.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use walvault_common::{Error, Result};

/// Granularity of delta comparison, matching the database page size.
pub const DELTA_BLOCK_SIZE: usize = 8192;

const MAGIC: &[u8; 8] = b"WVDELTA1";
const PREV_NAME_FILE: &str = "prev_segment_name";
const PREV_IMAGE_FILE: &str = "prev_segment";

/// Produces delta artifacts from consecutive segment uploads.
pub struct DeltaFileManager {
    dir: PathBuf,
    enabled: AtomicBool,
}

impl DeltaFileManager {
    /// Manager over a cache directory. Returns `None` when the directory
    /// cannot be created, in which case the caller proceeds without deltas.
    pub fn new(dir: impl Into<PathBuf>) -> Option<Self> {
        let dir = dir.into();
        match std::fs::create_dir_all(&dir) {
            Ok(()) => Some(Self {
                dir,
                enabled: AtomicBool::new(true),
            }),
            Err(e) => {
                warn!("can't use wal delta feature, delta folder {dir:?} unusable: {e}");
                None
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Compare `data` against the cached previous segment and cache `data`
    /// as the new previous image. Returns the encoded delta when one could
    /// be built.
    pub async fn build_delta(&self, wal_name: &str, data: &[u8]) -> Option<Vec<u8>> {
        if !self.is_enabled() {
            return None;
        }
        match self.build_delta_inner(wal_name, data).await {
            Ok(delta) => delta,
            Err(e) => {
                warn!("wal delta disabled: {e}");
                self.enabled.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    async fn build_delta_inner(&self, wal_name: &str, data: &[u8]) -> Result<Option<Vec<u8>>> {
        let prev = self.read_prev().await?;
        self.write_prev(wal_name, data).await?;

        match prev {
            Some((_, image)) if image.len() == data.len() => {
                Ok(Some(encode_delta(&image, data)))
            }
            _ => Ok(None),
        }
    }

    async fn read_prev(&self) -> Result<Option<(String, Vec<u8>)>> {
        let name = match tokio::fs::read_to_string(self.dir.join(PREV_NAME_FILE)).await {
            Ok(name) => name,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let image = tokio::fs::read(self.dir.join(PREV_IMAGE_FILE)).await?;
        Ok(Some((name, image)))
    }

    async fn write_prev(&self, wal_name: &str, data: &[u8]) -> Result<()> {
        tokio::fs::write(self.dir.join(PREV_IMAGE_FILE), data).await?;
        tokio::fs::write(self.dir.join(PREV_NAME_FILE), wal_name).await?;
        Ok(())
    }
}

/// Encode the blocks of `cur` that differ from `prev`. Both images must be
/// the same length.
fn encode_delta(prev: &[u8], cur: &[u8]) -> Vec<u8> {
    debug_assert_eq!(prev.len(), cur.len());

    let mut changed = Vec::new();
    for (index, (prev_block, cur_block)) in prev
        .chunks(DELTA_BLOCK_SIZE)
        .zip(cur.chunks(DELTA_BLOCK_SIZE))
        .enumerate()
    {
        if prev_block != cur_block {
            changed.push((index as u32, cur_block));
        }
    }

    let mut out = Vec::with_capacity(16 + changed.len() * (4 + DELTA_BLOCK_SIZE));
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(DELTA_BLOCK_SIZE as u32).to_be_bytes());
    out.extend_from_slice(&(changed.len() as u32).to_be_bytes());
    for (index, block) in changed {
        out.extend_from_slice(&index.to_be_bytes());
        out.extend_from_slice(block);
    }
    out
}

/// Reconstruct a segment from its predecessor and a delta artifact.
pub fn apply_delta(prev: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let bad = |msg: &str| Error::Serialization(format!("delta artifact: {msg}"));

    if delta.len() < 16 || &delta[..8] != MAGIC {
        return Err(bad("bad magic"));
    }
    let block_size = u32::from_be_bytes(delta[8..12].try_into().unwrap()) as usize;
    let count = u32::from_be_bytes(delta[12..16].try_into().unwrap()) as usize;

    let mut result = prev.to_vec();
    let mut offset = 16;
    for _ in 0..count {
        if delta.len() < offset + 4 {
            return Err(bad("truncated entry header"));
        }
        let index = u32::from_be_bytes(delta[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;

        let start = index * block_size;
        let len = block_size.min(result.len().saturating_sub(start));
        if len == 0 || delta.len() < offset + len {
            return Err(bad("entry out of bounds"));
        }
        result[start..start + len].copy_from_slice(&delta[offset..offset + len]);
        offset += len;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn segment(fill: u8) -> Vec<u8> {
        vec![fill; 4 * DELTA_BLOCK_SIZE]
    }

    #[tokio::test]
    async fn test_first_segment_yields_no_delta() {
        let dir = tempdir().unwrap();
        let manager = DeltaFileManager::new(dir.path().join("delta")).unwrap();
        assert!(manager.build_delta("seg1", &segment(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_consecutive_segments_yield_a_delta() {
        let dir = tempdir().unwrap();
        let manager = DeltaFileManager::new(dir.path().join("delta")).unwrap();

        let first = segment(1);
        manager.build_delta("seg1", &first).await;

        let mut second = first.clone();
        second[DELTA_BLOCK_SIZE] = 99; // dirty exactly one block
        let delta = manager.build_delta("seg2", &second).await.unwrap();

        // One changed block: header + one entry.
        assert_eq!(delta.len(), 16 + 4 + DELTA_BLOCK_SIZE);
        assert_eq!(apply_delta(&first, &delta).unwrap(), second);
    }

    #[tokio::test]
    async fn test_size_mismatch_skips_delta() {
        let dir = tempdir().unwrap();
        let manager = DeltaFileManager::new(dir.path().join("delta")).unwrap();
        manager.build_delta("seg1", &segment(1)).await;
        assert!(manager
            .build_delta("seg2", &vec![0u8; DELTA_BLOCK_SIZE])
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_fs_error_silently_disables() {
        let dir = tempdir().unwrap();
        let manager = DeltaFileManager::new(dir.path().join("delta")).unwrap();

        // Break the cache dir out from under the manager.
        std::fs::remove_dir_all(dir.path().join("delta")).unwrap();
        std::fs::write(dir.path().join("delta"), b"now a file").unwrap();

        assert!(manager.build_delta("seg1", &segment(1)).await.is_none());
        assert!(!manager.is_enabled());
        // Later segments keep flowing, silently without deltas.
        assert!(manager.build_delta("seg2", &segment(2)).await.is_none());
    }

    #[test]
    fn test_unusable_dir_disables_at_construction() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("occupied");
        std::fs::write(&file_path, b"x").unwrap();
        assert!(DeltaFileManager::new(file_path.join("sub")).is_none());
    }
}
