//! Multi-storage façade.
//!
//! Assembles the configured primary and failover folders, wires in the
//! status cache and the prober, and resolves which endpoints a request may
//! use. Probes never run while the status-cache mutex is held: the cache is
//! consulted, released, and only then is network I/O issued.

use std::sync::Arc;

use futures::future::join_all;
use tracing::info;

use walvault_common::{paths, Config, Error, Result, StorageConfig};
use walvault_storage::{Folder, FsFolder, LimitedFolder, MemoryFolder, RateLimiter};

use crate::cache::{AliveMap, SharedFile, StatusCache, StorageKey};
use crate::folder::MultiFolder;
use crate::policy::Policy;
use crate::prober::AliveProber;

/// The configured set of storages with aliveness tracking.
pub struct MultiStorage {
    storages: Vec<(String, Arc<dyn Folder>)>,
    cache: Arc<StatusCache>,
    prober: AliveProber,
}

impl MultiStorage {
    /// Build the façade from configuration. `check_write` selects read-write
    /// aliveness probes, used by operations that are about to upload.
    pub fn configure(config: &Config, check_write: bool) -> Result<Self> {
        let entries = config.storage_entries();
        if entries.is_empty() {
            return Err(Error::UnconfiguredStorage(vec![
                "storage.default".to_string()
            ]));
        }

        let limiter = (config.network_rate_limit_bytes > 0)
            .then(|| RateLimiter::new(config.network_rate_limit_bytes));

        let mut storages: Vec<(String, Arc<dyn Folder>)> = Vec::with_capacity(entries.len());
        let mut used_keys = Vec::with_capacity(entries.len());
        for (name, storage_config) in entries {
            let mut folder: Arc<dyn Folder> = match storage_config {
                StorageConfig::Fs { root } => FsFolder::new(root),
                StorageConfig::Memory => MemoryFolder::new(),
            };
            if let Some(limiter) = &limiter {
                folder = LimitedFolder::new(folder, Arc::clone(limiter));
            }
            if !config.storage_prefix.is_empty() {
                folder = folder.sub_folder(&paths::with_delimiter(&config.storage_prefix));
            }
            used_keys.push((
                name.clone(),
                StorageKey::new(name.clone(), storage_config.config_hash()),
            ));
            storages.push((name, folder));
        }

        let file = config.status_cache_file.as_ref().map(SharedFile::new);
        let cache = Arc::new(StatusCache::new(
            used_keys,
            config.status_cache_ttl(),
            file,
        ));
        let prober = if check_write {
            AliveProber::read_write(
                config.alive_check_timeout(),
                config.failover_check_size_bytes,
            )
        } else {
            AliveProber::read_only(config.alive_check_timeout())
        };

        Ok(Self::new(storages, cache, prober))
    }

    /// Assemble from already-built folders; tests inject folder doubles
    /// through this seam.
    pub fn new(
        storages: Vec<(String, Arc<dyn Folder>)>,
        cache: Arc<StatusCache>,
        prober: AliveProber,
    ) -> Self {
        Self {
            storages,
            cache,
            prober,
        }
    }

    /// Handle over every configured storage with the default policy.
    pub fn root_folder(&self) -> MultiFolder {
        MultiFolder::new(self.storages.clone(), Arc::clone(&self.cache))
    }

    pub fn status_cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    /// Pin the handle to the first alive storage, probing stale endpoints as
    /// needed.
    pub async fn use_first_alive(&self, folder: &MultiFolder) -> Result<MultiFolder> {
        let alive = self.find_alive(true).await?;
        let first = alive[0].clone();
        info!("using storage: {first}");
        Ok(folder.retain(&[first]))
    }

    /// Restrict the handle to every alive storage.
    pub async fn use_all_alive(&self, folder: &MultiFolder) -> Result<MultiFolder> {
        let alive = self.find_alive(false).await?;
        info!("using storages: {alive:?}");
        Ok(folder.retain(&alive))
    }

    /// Pin the handle to one named storage, verifying it is alive.
    pub async fn use_specific(&self, folder: &MultiFolder, name: &str) -> Result<MultiFolder> {
        let (storage_name, storage_folder) = self
            .storages
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| Error::UnknownStorage(name.to_string()))?;

        let names = vec![storage_name.clone()];
        let (relevant, _) = self.cache.read(&names)?;
        let alive = match relevant.get(storage_name) {
            Some(alive) => *alive,
            None => {
                let probed = self.prober.probe(storage_name, storage_folder).await.is_ok();
                let mut check_result = AliveMap::new();
                check_result.insert(storage_name.clone(), probed);
                self.cache.apply_explicit(&check_result, &names)?;
                probed
            }
        };
        if !alive {
            return Err(Error::StorageNotAlive(name.to_string()));
        }
        Ok(folder.retain(&names).with_policy(Policy::Specific(name.to_string())))
    }

    /// Names of the configured storages in routing order.
    pub fn storage_names(&self) -> Vec<String> {
        self.storages.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Resolve the alive subset, in configured order.
    ///
    /// Cached relevant facts are used as-is; everything without one is
    /// probed concurrently and the explicit results recorded. With
    /// `first_only`, a relevant-alive endpoint short-circuits probing
    /// entirely.
    async fn find_alive(&self, first_only: bool) -> Result<Vec<String>> {
        let names = self.storage_names();
        let (relevant, _outdated) = self.cache.read(&names)?;

        if first_only {
            if let Some(first) = names.iter().find(|n| relevant.get(*n) == Some(&true)) {
                return Ok(vec![first.clone()]);
            }
        }

        // Probe everything lacking a relevant fact. The cache mutex is not
        // held here; results are recorded afterwards in one explicit batch.
        let to_probe: Vec<&(String, Arc<dyn Folder>)> = self
            .storages
            .iter()
            .filter(|(name, _)| !relevant.contains_key(name))
            .collect();

        let probes = to_probe.iter().map(|(name, folder)| async {
            let alive = self.prober.probe(name, folder).await.is_ok();
            (name.clone(), alive)
        });
        let check_result: AliveMap = join_all(probes).await.into_iter().collect();

        let known = self.cache.apply_explicit(&check_result, &names)?;

        let alive: Vec<String> = names
            .iter()
            .filter(|name| {
                known.get(*name) == Some(&true) || relevant.get(*name) == Some(&true)
            })
            .cloned()
            .collect();
        if alive.is_empty() {
            return Err(Error::NoAliveStorage(names));
        }
        Ok(alive)
    }
}
