//! Storage aliveness status cache.
//!
//! The in-process half is a status map behind one mutex; the optional
//! on-disk half shares facts between command invocations and concurrent
//! agents. All file errors are recovered locally: the in-memory map stays
//! authoritative and a warning is the only trace.

mod file;
mod key;
mod status;

pub use file::SharedFile;
pub use key::StorageKey;
pub use status::{alive_map, merge, split_by_relevance, StatusMap, StorageStatus};

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

use walvault_common::{Error, Result};

/// `storage name -> alive` projection handed to routing.
pub type AliveMap = HashMap<String, bool>;

/// How old the on-disk mirror may get before a mutation rewrites it.
const FILE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// TTL-aware aliveness cache shared by every worker of this process.
pub struct StatusCache {
    /// All storages this cache may be asked about, in routing order
    used_keys: Vec<(String, StorageKey)>,
    ttl: Duration,
    mem: Mutex<StatusMap>,
    file: Option<SharedFile>,
}

impl StatusCache {
    pub fn new(used_keys: Vec<(String, StorageKey)>, ttl: Duration, file: Option<SharedFile>) -> Self {
        Self {
            used_keys,
            ttl,
            mem: Mutex::new(StatusMap::new()),
            file,
        }
    }

    /// Split the cached facts for `names` by TTL relevance. When everything
    /// requested is relevant in memory the disk is not touched; otherwise the
    /// on-disk map is merged in (best-effort) before splitting.
    pub fn read(&self, names: &[String]) -> Result<(AliveMap, AliveMap)> {
        let keys = self.corresponding_keys(names)?;
        let now = Utc::now();
        let mut mem = self.mem.lock();

        if status::all_relevant(&mem, self.ttl, &keys, now) {
            let (relevant, _) = split_by_relevance(&mem, self.ttl, &keys, now);
            return Ok((alive_map(&relevant), AliveMap::new()));
        }

        if let Some(file) = &self.file {
            match file.read() {
                Ok(from_disk) => *mem = merge(&mem, &from_disk),
                Err(e) => warn!("failed to read storage status cache file: {e}"),
            }
        }

        let (relevant, outdated) = split_by_relevance(&mem, self.ttl, &keys, now);
        Ok((alive_map(&relevant), alive_map(&outdated)))
    }

    /// Record the results of explicit probes and return the resulting
    /// `name -> alive` view for `names`.
    pub fn apply_explicit(
        &self,
        check_result: &AliveMap,
        names: &[String],
    ) -> Result<AliveMap> {
        let keys = self.corresponding_keys(names)?;
        let now = Utc::now();
        let mut mem = self.mem.lock();

        for (name, key) in &self.used_keys {
            if let Some(alive) = check_result.get(name) {
                mem.insert(key.clone(), StorageStatus::from_probe(*alive, now));
            }
        }

        let requested: StatusMap = keys
            .iter()
            .filter_map(|k| mem.get(k).map(|s| (k.clone(), *s)))
            .collect();
        let result = alive_map(&requested);

        self.flush_if_stale(&mut mem);
        Ok(result)
    }

    /// Record the outcome of a real folder operation against one storage.
    pub fn apply_operation(&self, name: &str, alive: bool, weight: i64) {
        let Some((_, key)) = self.used_keys.iter().find(|(n, _)| n == name) else {
            warn!("operation result for unconfigured storage {name:?} dropped");
            return;
        };
        let mut mem = self.mem.lock();
        let prev = mem.get(key).copied();
        mem.insert(
            key.clone(),
            StorageStatus::apply_operation(prev, alive, weight, Utc::now()),
        );
        self.flush_if_stale(&mut mem);
    }

    /// Merge memory with the on-disk map and write the merger back.
    pub fn flush(&self) {
        let Some(file) = &self.file else { return };
        let mut mem = self.mem.lock();
        Self::merge_and_write(file, &mut mem);
    }

    /// Whether the in-memory map mutex is currently held. Probing must not
    /// happen under the mutex; concurrency tests assert through this.
    pub fn is_locked(&self) -> bool {
        self.mem.is_locked()
    }

    /// Exactly one key per requested name, in request order.
    fn corresponding_keys(&self, names: &[String]) -> Result<Vec<StorageKey>> {
        names
            .iter()
            .map(|name| {
                self.used_keys
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, key)| key.clone())
                    .ok_or_else(|| Error::UnknownStorage(name.clone()))
            })
            .collect()
    }

    fn flush_if_stale(&self, mem: &mut StatusMap) {
        let Some(file) = &self.file else { return };
        let fresh = file
            .written_age()
            .is_some_and(|age| age < FILE_FLUSH_TIMEOUT);
        if fresh {
            return;
        }
        Self::merge_and_write(file, mem);
    }

    fn merge_and_write(file: &SharedFile, mem: &mut StatusMap) {
        match file.read() {
            Ok(from_disk) => *mem = merge(mem, &from_disk),
            Err(e) => warn!("failed to read storage status cache file before flush: {e}"),
        }
        if let Err(e) = file.write(mem) {
            warn!("failed to flush storage status cache file: {e}");
        }
    }
}
