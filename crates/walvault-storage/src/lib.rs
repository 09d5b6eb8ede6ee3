//! Folder capability over object stores.
//!
//! Defines the [`Folder`] trait every backend and wrapper implements, the
//! in-memory and filesystem backends, recursive listing helpers, and the
//! shared bandwidth limiter.

pub mod folder;
pub mod fs;
pub mod limiter;
pub mod list;
pub mod memory;

pub use folder::{content_from_bytes, read_object, Folder, Object, ObjectContent};
pub use fs::FsFolder;
pub use limiter::{LimitedFolder, RateLimiter};
pub use list::{list_folder_recursively, list_folder_recursively_with_prefix};
pub use memory::{Kvs, MemoryFolder};
