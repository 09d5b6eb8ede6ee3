//! The folder capability: a uniform container interface over any object store.
//!
//! Concrete backends, the bandwidth limiter and the multi-storage router all
//! implement [`Folder`]; callers only ever hold `Arc<dyn Folder>`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use walvault_common::{Error, Result};

/// Streamed object payload handed to `put` or returned by `read`.
pub type ObjectContent = Box<dyn AsyncRead + Send + Unpin>;

/// One stored object as seen in a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    /// Name relative to the listed folder
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    /// Which storage the object came from; only populated by multi-storage
    /// united listings
    pub storage: Option<String>,
}

impl Object {
    pub fn new(name: impl Into<String>, last_modified: DateTime<Utc>, size: u64) -> Self {
        Self {
            name: name.into(),
            last_modified,
            size,
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = Some(storage.into());
        self
    }
}

/// Uniform container interface over an object store.
///
/// Paths are relative to the folder; a folder path is either empty (the root)
/// or ends with `/`.
#[async_trait]
pub trait Folder: Send + Sync {
    /// Relative path of this folder from the storage root.
    fn path(&self) -> &str;

    /// List direct children: objects and sub-folder handles. A folder that
    /// does not exist yields empty lists, not an error.
    async fn list(&self) -> Result<(Vec<Object>, Vec<Arc<dyn Folder>>)>;

    /// Handle to a nested folder. Pure construction, never performs I/O.
    fn sub_folder(&self, rel: &str) -> Arc<dyn Folder>;

    /// Open an object for reading. Absent objects fail with `ObjectNotFound`.
    async fn read(&self, rel: &str) -> Result<ObjectContent>;

    /// Upload an object, overwriting any existing one with the same name.
    async fn put(&self, rel: &str, content: ObjectContent) -> Result<()>;

    /// Like `put`, but aborts the in-flight transfer when `deadline` elapses.
    async fn put_with_deadline(
        &self,
        deadline: Instant,
        rel: &str,
        content: ObjectContent,
    ) -> Result<()> {
        match tokio::time::timeout_at(deadline, self.put(rel, content)).await {
            Ok(res) => res,
            Err(_) => Err(Error::DeadlineExceeded),
        }
    }

    /// Delete objects if they exist; missing entries are not errors.
    async fn delete(&self, rel_paths: &[String]) -> Result<()>;

    /// Copy an object inside the folder. Fails if `src` is missing.
    async fn copy(&self, src: &str, dst: &str) -> Result<()>;

    /// Whether an object exists.
    async fn exists(&self, rel: &str) -> Result<bool>;
}

/// Read an object fully into memory.
pub async fn read_object(folder: &dyn Folder, rel: &str) -> Result<Vec<u8>> {
    let mut reader = folder.read(rel).await?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Wrap an owned byte buffer as `put` content.
pub fn content_from_bytes(bytes: Vec<u8>) -> ObjectContent {
    Box::new(std::io::Cursor::new(bytes))
}
