//! Configuration types for walvault
//!
//! The daemon reads a single TOML file. Storage endpoints are a primary
//! (always named "default") plus ordered failovers; everything else is knobs
//! with defaults.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Name under which the primary storage is always registered.
pub const PRIMARY_STORAGE_NAME: &str = "default";

/// Root configuration for walvault
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// PostgreSQL data directory; WAL segments are read from `<pgdata>/pg_wal`
    pub pgdata: PathBuf,

    /// Unix-domain socket the daemon listens on
    #[serde(default = "default_socket_path")]
    pub daemon_socket_path: PathBuf,

    /// Systemd notify socket; the NOTIFY_SOCKET env var takes precedence
    #[serde(default)]
    pub systemd_notify_socket: Option<PathBuf>,

    /// How long a storage aliveness fact stays relevant
    #[serde(default = "default_status_cache_ttl_secs")]
    pub status_cache_ttl_secs: u64,

    /// Per-probe timeout for aliveness checks
    #[serde(default = "default_alive_check_timeout_secs")]
    pub alive_check_timeout_secs: u64,

    /// Size of the blob written by a read-write aliveness probe
    #[serde(default = "default_failover_check_size_bytes")]
    pub failover_check_size_bytes: u64,

    /// Deadline for a single WAL segment upload requested over the socket
    #[serde(default = "default_daemon_wal_upload_timeout_secs")]
    pub daemon_wal_upload_timeout_secs: u64,

    /// Inter-process status cache file; unset disables the on-disk mirror
    #[serde(default = "default_status_cache_file")]
    pub status_cache_file: Option<PathBuf>,

    /// Compression method for archived segments ("lz4" or "zstd")
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Emit block-delta artifacts alongside full WAL segments
    #[serde(default)]
    pub use_wal_delta: bool,

    /// Network bandwidth limit in bytes per second, 0 = unlimited
    #[serde(default)]
    pub network_rate_limit_bytes: u64,

    /// Path prefix applied to every storage root
    #[serde(default)]
    pub storage_prefix: String,

    /// Storage endpoints
    pub storage: StorageSet,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/walvault.sock")
}

fn default_status_cache_ttl_secs() -> u64 {
    300
}

fn default_alive_check_timeout_secs() -> u64 {
    30
}

fn default_failover_check_size_bytes() -> u64 {
    1024 * 1024
}

fn default_daemon_wal_upload_timeout_secs() -> u64 {
    60
}

fn default_status_cache_file() -> Option<PathBuf> {
    Some(std::env::temp_dir().join("walvault_status_cache.json"))
}

fn default_compression() -> String {
    "lz4".to_string()
}

impl Config {
    /// Parse a TOML configuration document.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))
    }

    pub fn status_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.status_cache_ttl_secs)
    }

    pub fn alive_check_timeout(&self) -> Duration {
        Duration::from_secs(self.alive_check_timeout_secs)
    }

    pub fn daemon_wal_upload_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon_wal_upload_timeout_secs)
    }

    /// Path to the directory WAL segments are archived from.
    pub fn wal_dir(&self) -> PathBuf {
        self.pgdata.join("pg_wal")
    }

    /// All configured endpoints in routing order: primary first, then
    /// failovers in declaration order.
    pub fn storage_entries(&self) -> Vec<(String, &StorageConfig)> {
        let mut entries = vec![(PRIMARY_STORAGE_NAME.to_string(), &self.storage.default)];
        for fo in &self.storage.failover {
            entries.push((fo.name.clone(), &fo.config));
        }
        entries
    }
}

/// Primary storage plus ordered failovers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageSet {
    /// The primary endpoint, always addressed as "default"
    pub default: StorageConfig,
    /// Failover endpoints tried in declaration order
    #[serde(default)]
    pub failover: Vec<NamedStorageConfig>,
}

/// A failover endpoint with its configuration key as the name
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedStorageConfig {
    pub name: String,
    #[serde(flatten)]
    pub config: StorageConfig,
}

/// One storage endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local or mounted filesystem directory
    Fs { root: PathBuf },
    /// In-memory store; test double for remote backends
    Memory,
}

impl StorageConfig {
    /// Hash of the parameters that make two configs addressing the same
    /// bucket nonetheless distinct. Part of the status cache key, so two
    /// differently-configured endpoints never share an aliveness fact.
    pub fn config_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(&digest[..8])
    }
}
