//! Policy-bound folder over a set of storages.
//!
//! Wraps an ordered list of `(name, folder)` pairs and routes every folder
//! operation according to the attached [`Policy`]. Each backend operation's
//! outcome is reported to the status cache so future routing prefers
//! endpoints that recently worked.
//!
//! Invariant: all backend folders in one handle sit at the same relative
//! path; `sub_folder` descends into every backend at once.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;

use walvault_common::{paths, Error, Result};
use walvault_storage::{content_from_bytes, Folder, Object, ObjectContent};

use crate::cache::StatusCache;
use crate::policy::Policy;

/// Weight of a read or list confirmation.
const READ_WEIGHT: i64 = 1;
/// Weight of a write confirmation.
const WRITE_WEIGHT: i64 = 3;

/// Folder routing operations across several storages.
pub struct MultiFolder {
    path: String,
    storages: Vec<(String, Arc<dyn Folder>)>,
    policy: Policy,
    cache: Arc<StatusCache>,
}

impl MultiFolder {
    /// Root handle over the given storages, default policy.
    pub fn new(storages: Vec<(String, Arc<dyn Folder>)>, cache: Arc<StatusCache>) -> Self {
        Self {
            path: String::new(),
            storages,
            policy: Policy::default(),
            cache,
        }
    }

    /// Same handle with another policy. Pure; the original stays valid.
    pub fn with_policy(&self, policy: Policy) -> Self {
        Self {
            path: self.path.clone(),
            storages: self.storages.clone(),
            policy,
            cache: Arc::clone(&self.cache),
        }
    }

    /// Same handle restricted to the named storages, keeping configured
    /// order.
    pub fn retain(&self, names: &[String]) -> Self {
        Self {
            path: self.path.clone(),
            storages: self
                .storages
                .iter()
                .filter(|(n, _)| names.contains(n))
                .cloned()
                .collect(),
            policy: self.policy.clone(),
            cache: Arc::clone(&self.cache),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Names of the storages this handle may touch, for logging.
    pub fn storage_names(&self) -> Vec<String> {
        self.storages.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn status_cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    fn typed_sub_folder(&self, rel: &str) -> Self {
        let rel = paths::with_delimiter(rel);
        Self {
            path: paths::join(&self.path, &rel),
            storages: self
                .storages
                .iter()
                .map(|(n, f)| (n.clone(), f.sub_folder(&rel)))
                .collect(),
            policy: self.policy.clone(),
            cache: Arc::clone(&self.cache),
        }
    }

    fn report<T>(&self, name: &str, result: &Result<T>, weight: i64) {
        let alive = match result {
            Ok(_) => true,
            Err(e) => !e.indicates_dead_storage(),
        };
        self.cache.apply_operation(name, alive, weight);
    }

    /// The one storage single-target policies act upon.
    fn single_target(&self) -> Result<&(String, Arc<dyn Folder>)> {
        match &self.policy {
            Policy::Specific(name) => self
                .storages
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| Error::UnknownStorage(name.clone())),
            _ => self
                .storages
                .first()
                .ok_or_else(|| Error::NoAliveStorage(Vec::new())),
        }
    }

    /// Storages a write fans out to.
    fn write_targets(&self) -> Result<Vec<&(String, Arc<dyn Folder>)>> {
        if self.policy.broadcasts_writes() {
            if self.storages.is_empty() {
                return Err(Error::NoAliveStorage(Vec::new()));
            }
            Ok(self.storages.iter().collect())
        } else {
            Ok(vec![self.single_target()?])
        }
    }

    async fn put_impl(
        &self,
        deadline: Option<Instant>,
        rel: &str,
        mut content: ObjectContent,
    ) -> Result<()> {
        let targets = self.write_targets()?;

        if targets.len() == 1 {
            let (name, folder) = targets[0];
            let result = match deadline {
                Some(deadline) => folder.put_with_deadline(deadline, rel, content).await,
                None => folder.put(rel, content).await,
            };
            self.report(name, &result, WRITE_WEIGHT);
            return result;
        }

        // Broadcast needs the payload more than once; buffer it.
        let mut buf = Vec::new();
        content.read_to_end(&mut buf).await?;

        let uploads = targets.iter().map(|(name, folder)| {
            let payload = content_from_bytes(buf.clone());
            async move {
                let result = match deadline {
                    Some(deadline) => folder.put_with_deadline(deadline, rel, payload).await,
                    None => folder.put(rel, payload).await,
                };
                (name.as_str(), result)
            }
        });

        let mut first_err = None;
        for (name, result) in join_all(uploads).await {
            self.report(name, &result, WRITE_WEIGHT);
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Relative name of a sub-folder under its parent backend folder. Backends
/// may sit below a storage prefix, so the parent's own path is the base.
fn rel_under(parent: &str, sub: &Arc<dyn Folder>) -> String {
    sub.path()
        .strip_prefix(parent)
        .unwrap_or(sub.path())
        .to_string()
}

#[async_trait]
impl Folder for MultiFolder {
    fn path(&self) -> &str {
        &self.path
    }

    async fn list(&self) -> Result<(Vec<Object>, Vec<Arc<dyn Folder>>)> {
        if self.policy != Policy::UniteAll {
            let (name, folder) = self.single_target()?;
            let result = folder.list().await;
            self.report(name, &result, READ_WEIGHT);
            let parent = folder.path().to_string();
            let (objects, sub_folders) = result?;
            let wrapped = sub_folders
                .iter()
                .map(|sub| self.sub_folder(&rel_under(&parent, sub)))
                .collect();
            return Ok((objects, wrapped));
        }

        let mut objects = Vec::new();
        let mut sub_names = BTreeSet::new();
        for (name, folder) in &self.storages {
            let result = folder.list().await;
            self.report(name, &result, READ_WEIGHT);
            let (backend_objects, backend_subs) = result?;
            objects.extend(
                backend_objects
                    .into_iter()
                    .map(|o| o.with_storage(name.clone())),
            );
            for sub in &backend_subs {
                sub_names.insert(rel_under(folder.path(), sub));
            }
        }
        let sub_folders = sub_names
            .into_iter()
            .map(|rel| self.sub_folder(&rel))
            .collect();
        Ok((objects, sub_folders))
    }

    fn sub_folder(&self, rel: &str) -> Arc<dyn Folder> {
        Arc::new(self.typed_sub_folder(rel))
    }

    async fn read(&self, rel: &str) -> Result<ObjectContent> {
        if !self.policy.reads_fall_through() {
            let (name, folder) = self.single_target()?;
            let result = folder.read(rel).await;
            self.report(name, &result, READ_WEIGHT);
            return result;
        }

        for (name, folder) in &self.storages {
            let result = folder.read(rel).await;
            self.report(name, &result, READ_WEIGHT);
            match result {
                Err(e) if e.is_not_found() => continue,
                other => return other,
            }
        }
        Err(Error::ObjectNotFound(paths::join(&self.path, rel)))
    }

    async fn put(&self, rel: &str, content: ObjectContent) -> Result<()> {
        self.put_impl(None, rel, content).await
    }

    async fn put_with_deadline(
        &self,
        deadline: Instant,
        rel: &str,
        content: ObjectContent,
    ) -> Result<()> {
        self.put_impl(Some(deadline), rel, content).await
    }

    async fn delete(&self, rel_paths: &[String]) -> Result<()> {
        let targets = self.write_targets()?;
        let mut first_err = None;
        for (name, folder) in targets {
            let result = folder.delete(rel_paths).await;
            self.report(name, &result, WRITE_WEIGHT);
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let targets = self.write_targets()?;
        let mut first_err = None;
        for (name, folder) in targets {
            let result = folder.copy(src, dst).await;
            self.report(name, &result, WRITE_WEIGHT);
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn exists(&self, rel: &str) -> Result<bool> {
        if !self.policy.reads_fall_through() {
            let (name, folder) = self.single_target()?;
            let result = folder.exists(rel).await;
            self.report(name, &result, READ_WEIGHT);
            return result;
        }

        for (name, folder) in &self.storages {
            let result = folder.exists(rel).await;
            self.report(name, &result, READ_WEIGHT);
            if result? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
