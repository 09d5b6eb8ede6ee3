//! WAL segment fetch pipeline.
//!
//! Used during recovery: locate the archived segment under any known codec
//! extension, decrypt and decompress it, and land it at the destination
//! atomically (temp file + rename). A segment absent under every name is
//! `ArchiveNonExistence`, which the daemon reports distinctly so the
//! database can stop recovery cleanly.

use std::path::Path;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use walvault_common::{Error, Result};
use walvault_storage::{read_object, Folder};

use crate::compression::ALL_COMPRESSIONS;
use crate::crypto::Crypter;

/// Command-level deadline the daemon applies to a fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetch one archived segment from `folder` (positioned at the WAL archive
/// path) into `dest`.
pub async fn fetch_wal(
    folder: &dyn Folder,
    wal_name: &str,
    dest: &Path,
    crypter: Option<&dyn Crypter>,
) -> Result<()> {
    let data = locate_and_open(folder, wal_name, crypter).await?;
    write_atomically(dest, &data).await
}

/// Try every codec extension, then the raw name. Only when every candidate
/// is missing in every storage does the segment not exist.
async fn locate_and_open(
    folder: &dyn Folder,
    wal_name: &str,
    crypter: Option<&dyn Crypter>,
) -> Result<Vec<u8>> {
    for codec in ALL_COMPRESSIONS {
        let object = format!("{wal_name}.{}", codec.extension());
        match read_object(folder, &object).await {
            Ok(sealed) => {
                debug!("found {object}");
                let compressed = unseal(sealed, crypter)?;
                return codec.decompress(&compressed);
            }
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }

    match read_object(folder, wal_name).await {
        Ok(sealed) => unseal(sealed, crypter),
        Err(e) if e.is_not_found() => Err(Error::ArchiveNonExistence(wal_name.to_string())),
        Err(e) => Err(e),
    }
}

fn unseal(data: Vec<u8>, crypter: Option<&dyn Crypter>) -> Result<Vec<u8>> {
    match crypter {
        Some(crypter) => crypter.decrypt(data),
        None => Ok(data),
    }
}

/// Write to a temp file next to the destination, then rename into place so a
/// crashed fetch never leaves a half-written segment behind.
async fn write_atomically(dest: &Path, data: &[u8]) -> Result<()> {
    let dir = dest.parent().ok_or_else(|| {
        Error::configuration(format!("destination {dest:?} has no parent directory"))
    })?;
    let temp = dir.join(format!(".walvault_fetch_{}", Uuid::new_v4().simple()));

    if let Err(e) = tokio::fs::write(&temp, data).await {
        return Err(e.into());
    }
    match tokio::fs::rename(&temp, dest).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp).await;
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compression;
    use tempfile::tempdir;
    use walvault_storage::{content_from_bytes, MemoryFolder};

    #[tokio::test]
    async fn test_fetch_roundtrip() {
        let folder = MemoryFolder::new();
        let sealed = Compression::Lz4.compress(b"segment bytes").unwrap();
        folder
            .put("000000010000000000000001.lz4", content_from_bytes(sealed))
            .await
            .unwrap();

        let dir = tempdir().unwrap();
        let dest = dir.path().join("restored");
        fetch_wal(folder.as_ref(), "000000010000000000000001", &dest, None)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"segment bytes");
        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name() != "restored")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_tries_every_codec() {
        let folder = MemoryFolder::new();
        let sealed = Compression::Zstd.compress(b"zstd segment").unwrap();
        folder
            .put("000000010000000000000002.zst", content_from_bytes(sealed))
            .await
            .unwrap();

        let dir = tempdir().unwrap();
        let dest = dir.path().join("restored");
        fetch_wal(folder.as_ref(), "000000010000000000000002", &dest, None)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"zstd segment");
    }

    #[tokio::test]
    async fn test_fetch_uncompressed_fallback() {
        let folder = MemoryFolder::new();
        folder
            .put(
                "00000002.history",
                content_from_bytes(b"1\t0/2000000\treason".to_vec()),
            )
            .await
            .unwrap();

        let dir = tempdir().unwrap();
        let dest = dir.path().join("history");
        fetch_wal(folder.as_ref(), "00000002.history", &dest, None)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"1\t0/2000000\treason");
    }

    #[tokio::test]
    async fn test_missing_segment_is_archive_non_existence() {
        let folder = MemoryFolder::new();
        let dir = tempdir().unwrap();
        let dest = dir.path().join("never_written");

        let err = fetch_wal(folder.as_ref(), "000000010000000000000099", &dest, None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ArchiveNonExistence(_)));
        assert!(!dest.exists());
    }
}
