//! Base backup listing.
//!
//! A completed backup is denoted by a sentinel object
//! `base_<name>_backup_stop_sentinel.json` in the base-backup path; the
//! per-backup metadata lives at `base_<name>/metadata.json`. Listing strips
//! the sentinel suffix and emits one row per backup, or one row per
//! `(backup, storage)` pair under a united multi-storage listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use walvault_common::{paths, Result, PRIMARY_STORAGE_NAME};
use walvault_storage::{read_object, Folder};

use crate::names::strip_wal_file_name;

/// One row of a backup listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupTime {
    pub backup_name: String,
    pub time: DateTime<Utc>,
    pub wal_file_name: String,
    pub storage_name: String,
}

/// List completed backups under the storage root, ordered by time then name.
pub async fn list_backups(root_folder: &dyn Folder) -> Result<Vec<BackupTime>> {
    let backup_folder = root_folder.sub_folder(paths::BASE_BACKUP_PATH);
    let (objects, _) = backup_folder.list().await?;

    let mut backups: Vec<BackupTime> = objects
        .into_iter()
        .filter_map(|object| {
            let backup_name = object.name.strip_suffix(paths::SENTINEL_SUFFIX)?.to_string();
            Some(BackupTime {
                wal_file_name: strip_wal_file_name(&backup_name),
                backup_name,
                time: object.last_modified,
                storage_name: object
                    .storage
                    .unwrap_or_else(|| PRIMARY_STORAGE_NAME.to_string()),
            })
        })
        .collect();
    backups.sort_by(|a, b| {
        (a.time, &a.backup_name, &a.storage_name).cmp(&(b.time, &b.backup_name, &b.storage_name))
    });
    Ok(backups)
}

/// Render listing rows the way the CLI layer prints them.
pub fn render_backup_list(backups: &[BackupTime]) -> Result<String> {
    serde_json::to_string_pretty(backups)
        .map_err(|e| walvault_common::Error::Serialization(e.to_string()))
}

/// Read the metadata object of one backup.
pub async fn fetch_backup_metadata(root_folder: &dyn Folder, backup_name: &str) -> Result<Vec<u8>> {
    let backup_folder = root_folder
        .sub_folder(paths::BASE_BACKUP_PATH)
        .sub_folder(&format!("{backup_name}/"));
    read_object(backup_folder.as_ref(), paths::METADATA_NAME).await
}
