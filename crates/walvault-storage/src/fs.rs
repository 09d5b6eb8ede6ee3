//! Filesystem folder backend.
//!
//! Maps the folder contract onto a local or mounted directory tree via
//! `tokio::fs`. This is the backend behind `kind = "fs"` storages.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use walvault_common::{paths, Error, Result};

use crate::folder::{Folder, Object, ObjectContent};

/// Folder over a directory on the local filesystem.
pub struct FsFolder {
    /// Absolute location of this folder on disk
    root: PathBuf,
    /// Path relative to the storage root
    path: String,
}

impl FsFolder {
    /// Folder at the root of the given directory. The directory does not
    /// have to exist yet; it is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            path: String::new(),
        })
    }

    fn object_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Absolute on-disk location of the folder root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn modified_time(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl Folder for FsFolder {
    fn path(&self) -> &str {
        &self.path
    }

    async fn list(&self) -> Result<(Vec<Object>, Vec<Arc<dyn Folder>>)> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Vec::new(), Vec::new())),
            Err(e) => return Err(e.into()),
        };

        let mut objects = Vec::new();
        let mut sub_folders: Vec<Arc<dyn Folder>> = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                sub_folders.push(self.sub_folder(&format!("{name}/")));
            } else {
                objects.push(Object::new(name, modified_time(&meta), meta.len()));
            }
        }
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok((objects, sub_folders))
    }

    fn sub_folder(&self, rel: &str) -> Arc<dyn Folder> {
        let rel = paths::with_delimiter(rel);
        Arc::new(Self {
            root: self.root.join(rel.trim_end_matches('/')),
            path: paths::join(&self.path, &rel),
        })
    }

    async fn read(&self, rel: &str) -> Result<ObjectContent> {
        match tokio::fs::File::open(self.object_path(rel)).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::ObjectNotFound(paths::join(&self.path, rel)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, rel: &str, mut content: ObjectContent) -> Result<()> {
        let target = self.object_path(rel);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&target).await?;
        tokio::io::copy(&mut content, &mut file).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn delete(&self, rel_paths: &[String]) -> Result<()> {
        for rel in rel_paths {
            match tokio::fs::remove_file(self.object_path(rel)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let dst_path = self.object_path(dst);
        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::copy(self.object_path(src), dst_path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::ObjectNotFound(paths::join(&self.path, src)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, rel: &str) -> Result<bool> {
        match tokio::fs::metadata(self.object_path(rel)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::{content_from_bytes, read_object};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_read_roundtrip() {
        let dir = tempdir().unwrap();
        let folder = FsFolder::new(dir.path());

        folder
            .put("wal_005/seg", content_from_bytes(b"payload".to_vec()))
            .await
            .unwrap();

        assert!(dir.path().join("wal_005/seg").is_file());
        let data = read_object(folder.as_ref(), "wal_005/seg").await.unwrap();
        assert_eq!(data, b"payload");
    }

    #[tokio::test]
    async fn test_missing_dir_lists_empty() {
        let dir = tempdir().unwrap();
        let folder = FsFolder::new(dir.path().join("not_created"));
        let (objects, sub_folders) = folder.list().await.unwrap();
        assert!(objects.is_empty());
        assert!(sub_folders.is_empty());
    }

    #[tokio::test]
    async fn test_list_and_sub_folder_paths() {
        let dir = tempdir().unwrap();
        let folder = FsFolder::new(dir.path());
        folder.put("a", content_from_bytes(vec![1, 2])).await.unwrap();
        folder.put("sub/b", content_from_bytes(vec![3])).await.unwrap();

        let (objects, sub_folders) = folder.list().await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name, "a");
        assert_eq!(objects[0].size, 2);
        assert_eq!(sub_folders.len(), 1);
        assert_eq!(sub_folders[0].path(), "sub/");
    }

    #[tokio::test]
    async fn test_delete_and_exists() {
        let dir = tempdir().unwrap();
        let folder = FsFolder::new(dir.path());
        folder.put("x", content_from_bytes(vec![0])).await.unwrap();

        assert!(folder.exists("x").await.unwrap());
        folder.delete(&["x".to_string(), "ghost".to_string()]).await.unwrap();
        assert!(!folder.exists("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy() {
        let dir = tempdir().unwrap();
        let folder = FsFolder::new(dir.path());
        folder.put("src", content_from_bytes(b"v".to_vec())).await.unwrap();

        folder.copy("src", "nested/dst").await.unwrap();
        assert_eq!(read_object(folder.as_ref(), "nested/dst").await.unwrap(), b"v");

        let err = folder.copy("ghost", "y").await.err().unwrap();
        assert!(matches!(err, Error::ObjectNotFound(_)));
    }
}
