//! Error types for walvault
//!
//! This module defines the common error type used throughout the system.

use thiserror::Error;

/// Common result type for walvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for walvault
#[derive(Debug, Error)]
pub enum Error {
    // Storage selection errors
    #[error("no storage is configured, please set one of: {0:?}")]
    UnconfiguredStorage(Vec<String>),

    #[error("unknown storage: {0}")]
    UnknownStorage(String),

    #[error("storage is not alive: {0}")]
    StorageNotAlive(String),

    #[error("no alive storage among: {0:?}")]
    NoAliveStorage(Vec<String>),

    // Folder errors
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("archived segment does not exist: {0}")]
    ArchiveNonExistence(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("transport error: {0}")]
    Transport(String),

    // Daemon protocol errors
    #[error("frame error: {0}")]
    Frame(String),

    #[error("socket write failed: {0}")]
    SocketWriteFailed(String),

    // Status cache errors
    #[error("cache file error: {0}")]
    CacheFile(String),

    // Ambient errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a frame error
    pub fn frame(msg: impl Into<String>) -> Self {
        Self::Frame(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound(_) | Self::ArchiveNonExistence(_)
        )
    }

    /// Check if this error means the storage endpoint itself failed, as
    /// opposed to a well-formed negative answer such as a missing object.
    /// Routing uses this to decide whether to mark an endpoint dead.
    #[must_use]
    pub fn indicates_dead_storage(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::DeadlineExceeded | Self::Io(_)
        )
    }
}
