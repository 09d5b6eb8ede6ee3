//! In-memory folder backend.
//!
//! Backed by a key-value store shared between the root folder and all of its
//! sub-folder handles. Stands in for remote backends in tests, including an
//! injectable clock so listings carry deterministic modification times.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::io::AsyncReadExt;

use walvault_common::{paths, Error, Result};

use crate::folder::{Folder, Object, ObjectContent};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    data: Bytes,
    modified: DateTime<Utc>,
}

/// Shared key-value store behind one or more [`MemoryFolder`] handles.
pub struct Kvs {
    entries: RwLock<BTreeMap<String, Entry>>,
    clock: Clock,
}

impl Kvs {
    pub fn new() -> Arc<Self> {
        Self::with_clock(Box::new(Utc::now))
    }

    /// A store whose modification times come from the given clock.
    pub fn with_clock(clock: Clock) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(BTreeMap::new()),
            clock,
        })
    }
}

/// Folder view over a [`Kvs`] at some path.
pub struct MemoryFolder {
    path: String,
    kvs: Arc<Kvs>,
}

impl MemoryFolder {
    /// Root folder over a fresh store.
    pub fn new() -> Arc<Self> {
        Self::at("", Kvs::new())
    }

    pub fn at(path: impl Into<String>, kvs: Arc<Kvs>) -> Arc<Self> {
        Arc::new(Self {
            path: paths::with_delimiter(&path.into()),
            kvs,
        })
    }

    fn full_key(&self, rel: &str) -> String {
        paths::join(&self.path, rel)
    }
}

#[async_trait]
impl Folder for MemoryFolder {
    fn path(&self) -> &str {
        &self.path
    }

    async fn list(&self) -> Result<(Vec<Object>, Vec<Arc<dyn Folder>>)> {
        let mut objects = Vec::new();
        let mut sub_names = std::collections::BTreeSet::new();

        let entries = self.kvs.entries.read();
        for (key, entry) in entries.range(self.path.clone()..) {
            let Some(remainder) = key.strip_prefix(self.path.as_str()) else {
                break;
            };
            match remainder.split_once('/') {
                Some((dir, _)) => {
                    sub_names.insert(dir.to_string());
                }
                None => objects.push(Object::new(remainder, entry.modified, entry.data.len() as u64)),
            }
        }
        drop(entries);

        let sub_folders = sub_names
            .into_iter()
            .map(|name| self.sub_folder(&format!("{name}/")))
            .collect();
        Ok((objects, sub_folders))
    }

    fn sub_folder(&self, rel: &str) -> Arc<dyn Folder> {
        MemoryFolder::at(paths::join(&self.path, &paths::with_delimiter(rel)), Arc::clone(&self.kvs))
    }

    async fn read(&self, rel: &str) -> Result<ObjectContent> {
        let key = self.full_key(rel);
        let entries = self.kvs.entries.read();
        match entries.get(&key) {
            Some(entry) => Ok(Box::new(Cursor::new(entry.data.clone()))),
            None => Err(Error::ObjectNotFound(key)),
        }
    }

    async fn put(&self, rel: &str, mut content: ObjectContent) -> Result<()> {
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;
        let entry = Entry {
            data: Bytes::from(data),
            modified: (self.kvs.clock)(),
        };
        self.kvs.entries.write().insert(self.full_key(rel), entry);
        Ok(())
    }

    async fn delete(&self, rel_paths: &[String]) -> Result<()> {
        let mut entries = self.kvs.entries.write();
        for rel in rel_paths {
            entries.remove(&self.full_key(rel));
        }
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let src_key = self.full_key(src);
        let dst_key = self.full_key(dst);
        let mut entries = self.kvs.entries.write();
        match entries.get(&src_key).cloned() {
            Some(entry) => {
                entries.insert(dst_key, entry);
                Ok(())
            }
            None => Err(Error::ObjectNotFound(src_key)),
        }
    }

    async fn exists(&self, rel: &str) -> Result<bool> {
        Ok(self.kvs.entries.read().contains_key(&self.full_key(rel)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::{content_from_bytes, read_object};

    #[tokio::test]
    async fn test_put_read_roundtrip() {
        let folder = MemoryFolder::new();
        folder
            .put("a.txt", content_from_bytes(b"hello".to_vec()))
            .await
            .unwrap();

        let data = read_object(folder.as_ref(), "a.txt").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let folder = MemoryFolder::new();
        let err = folder.read("gone").await.err().unwrap();
        assert!(matches!(err, Error::ObjectNotFound(_)));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let folder = MemoryFolder::new();
        folder.put("x", content_from_bytes(b"one".to_vec())).await.unwrap();
        folder.put("x", content_from_bytes(b"two".to_vec())).await.unwrap();
        assert_eq!(read_object(folder.as_ref(), "x").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let folder = MemoryFolder::new();
        folder.put("x", content_from_bytes(vec![1])).await.unwrap();
        folder.delete(&["x".to_string()]).await.unwrap();
        folder.delete(&["x".to_string()]).await.unwrap();
        assert!(!folder.exists("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_splits_objects_and_folders() {
        let folder = MemoryFolder::new();
        folder.put("top", content_from_bytes(vec![])).await.unwrap();
        folder.put("sub/inner", content_from_bytes(vec![])).await.unwrap();
        folder.put("sub/deeper/x", content_from_bytes(vec![])).await.unwrap();

        let (objects, sub_folders) = folder.list().await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name, "top");
        assert_eq!(sub_folders.len(), 1);
        assert_eq!(sub_folders[0].path(), "sub/");
    }

    #[tokio::test]
    async fn test_missing_folder_lists_empty() {
        let folder = MemoryFolder::new().sub_folder("nothing/");
        let (objects, sub_folders) = folder.list().await.unwrap();
        assert!(objects.is_empty());
        assert!(sub_folders.is_empty());
    }

    #[tokio::test]
    async fn test_copy_missing_source_fails() {
        let folder = MemoryFolder::new();
        assert!(folder.copy("a", "b").await.is_err());

        folder.put("a", content_from_bytes(b"v".to_vec())).await.unwrap();
        folder.copy("a", "b").await.unwrap();
        assert_eq!(read_object(folder.as_ref(), "b").await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn test_custom_clock_stamps_listings() {
        let fixed = chrono::DateTime::parse_from_rfc3339("2023-07-22T04:26:40Z")
            .unwrap()
            .with_timezone(&Utc);
        let folder = MemoryFolder::at("", Kvs::with_clock(Box::new(move || fixed)));
        folder.put("s", content_from_bytes(vec![])).await.unwrap();

        let (objects, _) = folder.list().await.unwrap();
        assert_eq!(objects[0].last_modified, fixed);
    }
}
