//! WAL archiving pipelines and backup listing.
//!
//! Everything between the daemon's socket handlers and the folder
//! capability: compression codecs, the encryption seam, delta artifacts,
//! archive-status bookkeeping, segment upload and fetch, and the base-backup
//! listing contract.

pub mod asm;
pub mod backup;
pub mod compression;
pub mod crypto;
pub mod delta;
pub mod fetch;
pub mod names;
pub mod uploader;

pub use asm::{ArchiveStatusManager, PgArchiveStatusManager};
pub use backup::{fetch_backup_metadata, list_backups, render_backup_list, BackupTime};
pub use compression::{Compression, ALL_COMPRESSIONS};
pub use crypto::Crypter;
pub use delta::DeltaFileManager;
pub use fetch::{fetch_wal, DEFAULT_FETCH_TIMEOUT};
pub use names::{is_valid_wal_object_name, is_wal_segment_name, strip_wal_file_name};
pub use uploader::WalUploader;
