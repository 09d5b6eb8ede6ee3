//! Shared foundation for the walvault workspace: the common error type,
//! configuration structures, and the storage path contract.

pub mod config;
pub mod error;
pub mod paths;

pub use config::{Config, NamedStorageConfig, StorageConfig, StorageSet, PRIMARY_STORAGE_NAME};
pub use error::{Error, Result};
