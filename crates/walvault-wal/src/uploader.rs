//! WAL segment upload pipeline.
//!
//! Bound once per daemon lifetime: a compressor, an optional crypter between
//! the compressor and the folder, the optional delta manager, and the
//! archive-status managers. Uploading a segment reads the source file,
//! seals it, and drives `put_with_deadline` against the routed folder.

use std::path::Path;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use walvault_common::{Error, Result};
use walvault_storage::{content_from_bytes, Folder};

use crate::asm::{ArchiveStatusManager, PgArchiveStatusManager};
use crate::compression::Compression;
use crate::crypto::Crypter;
use crate::delta::DeltaFileManager;

/// Uploads WAL segments into one target folder.
pub struct WalUploader {
    folder: Arc<dyn Folder>,
    compression: Compression,
    crypter: Option<Arc<dyn Crypter>>,
    delta: Option<DeltaFileManager>,
    archive_status: ArchiveStatusManager,
    pg_archive_status: PgArchiveStatusManager,
}

impl WalUploader {
    /// Uploader writing into `folder` (already positioned at the WAL archive
    /// path and already policy-routed).
    pub fn new(folder: Arc<dyn Folder>, compression: Compression) -> Self {
        Self {
            folder,
            compression,
            crypter: None,
            delta: None,
            archive_status: ArchiveStatusManager::nop(),
            pg_archive_status: PgArchiveStatusManager::nop(),
        }
    }

    pub fn with_crypter(mut self, crypter: Arc<dyn Crypter>) -> Self {
        self.crypter = Some(crypter);
        self
    }

    pub fn with_delta(mut self, delta: Option<DeltaFileManager>) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_archive_status(mut self, manager: ArchiveStatusManager) -> Self {
        self.archive_status = manager;
        self
    }

    pub fn with_pg_archive_status(mut self, manager: PgArchiveStatusManager) -> Self {
        self.pg_archive_status = manager;
        self
    }

    /// Archive one segment file. The deadline aborts the in-flight transfer
    /// through the folder capability.
    pub async fn upload_wal(&self, source: &Path, deadline: Instant) -> Result<()> {
        let wal_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::configuration(format!("bad wal source path {source:?}")))?;

        if self.archive_status.is_wal_already_uploaded(wal_name).await {
            debug!("{wal_name} already archived, skipping");
            self.sync_status(wal_name).await;
            return Ok(());
        }

        let data = tokio::fs::read(source).await?;

        if let Some(delta) = &self.delta {
            if let Some(artifact) = delta.build_delta(wal_name, &data).await {
                self.upload_delta(wal_name, &artifact, deadline).await;
            }
        }

        let object = format!("{wal_name}.{}", self.compression.extension());
        let payload = self.seal(&data)?;
        self.folder
            .put_with_deadline(deadline, &object, content_from_bytes(payload))
            .await?;
        debug!("{wal_name} archived as {object}");

        self.sync_status(wal_name).await;
        Ok(())
    }

    /// Compress, then encrypt when a crypter is configured.
    fn seal(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compressed = self.compression.compress(data)?;
        match &self.crypter {
            Some(crypter) => crypter.encrypt(compressed),
            None => Ok(compressed),
        }
    }

    /// Delta artifacts ride along on a best-effort basis; the full segment
    /// is the operation that may fail the archive.
    async fn upload_delta(&self, wal_name: &str, artifact: &[u8], deadline: Instant) {
        let object = format!("{wal_name}.delta.{}", self.compression.extension());
        let payload = match self.seal(artifact) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to seal delta for {wal_name}: {e}");
                return;
            }
        };
        if let Err(e) = self
            .folder
            .put_with_deadline(deadline, &object, content_from_bytes(payload))
            .await
        {
            warn!("failed to upload delta {object}: {e}");
        }
    }

    /// A marker without the matching `.done` rename would make the next push
    /// skip the sync, so a failed rename rolls the marker back.
    async fn sync_status(&self, wal_name: &str) {
        if let Err(e) = self.archive_status.mark_wal_uploaded(wal_name).await {
            warn!("failed to mark {wal_name} archived: {e}");
            return;
        }
        if let Err(e) = self.pg_archive_status.rename_ready_to_done(wal_name).await {
            warn!("failed to sync archive_status for {wal_name}: {e}");
            if let Err(e) = self.archive_status.unmark_wal_uploaded(wal_name).await {
                warn!("failed to unmark {wal_name}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compression;
    use crate::delta::apply_delta;
    use std::time::Duration;
    use tempfile::tempdir;
    use walvault_storage::{read_object, MemoryFolder};

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    async fn write_segment(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, data).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_compresses_under_wal_name() {
        let dir = tempdir().unwrap();
        let source =
            write_segment(dir.path(), "000000010000000000000001", b"segment payload").await;

        let folder = MemoryFolder::new();
        let uploader = WalUploader::new(folder.clone(), Compression::Lz4);
        uploader.upload_wal(&source, far_deadline()).await.unwrap();

        let stored = read_object(folder.as_ref(), "000000010000000000000001.lz4")
            .await
            .unwrap();
        assert_eq!(
            Compression::Lz4.decompress(&stored).unwrap(),
            b"segment payload"
        );
    }

    #[tokio::test]
    async fn test_already_uploaded_segment_is_skipped() {
        let dir = tempdir().unwrap();
        let source = write_segment(dir.path(), "000000010000000000000002", b"data").await;

        let folder = MemoryFolder::new();
        let asm = ArchiveStatusManager::new(dir.path().join("markers"));
        asm.mark_wal_uploaded("000000010000000000000002").await.unwrap();

        let uploader =
            WalUploader::new(folder.clone(), Compression::Lz4).with_archive_status(asm);
        uploader.upload_wal(&source, far_deadline()).await.unwrap();

        // Nothing hit the storage.
        let (objects, _) = folder.list().await.unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn test_upload_marks_archive_status() {
        let dir = tempdir().unwrap();
        let source = write_segment(dir.path(), "000000010000000000000003", b"data").await;

        let folder = MemoryFolder::new();
        let uploader = WalUploader::new(folder, Compression::Lz4)
            .with_archive_status(ArchiveStatusManager::new(dir.path().join("markers")));
        uploader.upload_wal(&source, far_deadline()).await.unwrap();

        let asm = ArchiveStatusManager::new(dir.path().join("markers"));
        assert!(asm.is_wal_already_uploaded("000000010000000000000003").await);
    }

    #[tokio::test]
    async fn test_failed_status_sync_rolls_back_the_marker() {
        let dir = tempdir().unwrap();
        let source = write_segment(dir.path(), "000000010000000000000007", b"data").await;

        let status_dir = dir.path().join("archive_status");
        std::fs::create_dir_all(&status_dir).unwrap();
        std::fs::write(status_dir.join("000000010000000000000007.ready"), b"").unwrap();
        // A directory squatting on the .done path makes the rename fail.
        std::fs::create_dir_all(status_dir.join("000000010000000000000007.done")).unwrap();

        let uploader = WalUploader::new(MemoryFolder::new(), Compression::Lz4)
            .with_archive_status(ArchiveStatusManager::new(dir.path().join("markers")))
            .with_pg_archive_status(PgArchiveStatusManager::new(&status_dir));
        uploader.upload_wal(&source, far_deadline()).await.unwrap();

        let asm = ArchiveStatusManager::new(dir.path().join("markers"));
        assert!(!asm.is_wal_already_uploaded("000000010000000000000007").await);
    }

    #[tokio::test]
    async fn test_delta_artifact_rides_along() {
        let dir = tempdir().unwrap();
        let first = vec![1u8; 16384];
        let mut second = first.clone();
        second[0] = 2;

        let src1 = write_segment(dir.path(), "000000010000000000000004", &first).await;
        let src2 = write_segment(dir.path(), "000000010000000000000005", &second).await;

        let folder = MemoryFolder::new();
        let uploader = WalUploader::new(folder.clone(), Compression::Lz4)
            .with_delta(DeltaFileManager::new(dir.path().join("delta")));

        uploader.upload_wal(&src1, far_deadline()).await.unwrap();
        uploader.upload_wal(&src2, far_deadline()).await.unwrap();

        let raw = read_object(folder.as_ref(), "000000010000000000000005.delta.lz4")
            .await
            .unwrap();
        let artifact = Compression::Lz4.decompress(&raw).unwrap();
        assert_eq!(apply_delta(&first, &artifact).unwrap(), second);
    }

    #[tokio::test]
    async fn test_crypter_is_applied_after_compression() {
        struct Flip;
        impl Crypter for Flip {
            fn encrypt(&self, mut data: Vec<u8>) -> walvault_common::Result<Vec<u8>> {
                data.iter_mut().for_each(|b| *b = !*b);
                Ok(data)
            }
            fn decrypt(&self, data: Vec<u8>) -> walvault_common::Result<Vec<u8>> {
                self.encrypt(data)
            }
        }

        let dir = tempdir().unwrap();
        let source = write_segment(dir.path(), "000000010000000000000006", b"secret").await;

        let folder = MemoryFolder::new();
        let uploader =
            WalUploader::new(folder.clone(), Compression::Lz4).with_crypter(Arc::new(Flip));
        uploader.upload_wal(&source, far_deadline()).await.unwrap();

        let stored = read_object(folder.as_ref(), "000000010000000000000006.lz4")
            .await
            .unwrap();
        let decrypted = Flip.decrypt(stored).unwrap();
        assert_eq!(Compression::Lz4.decompress(&decrypted).unwrap(), b"secret");
    }
}
