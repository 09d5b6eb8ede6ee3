//! Storage path and filename constants shared by the archive and listing code.
//!
//! These names are a wire contract with the CLI layer and with older agents
//! reading the same bucket, so they are spelled out once here.

/// Sub-path where WAL segments are archived.
pub const WAL_PATH: &str = "wal_005/";

/// Sub-path where base backups live.
pub const BASE_BACKUP_PATH: &str = "basebackups_005/";

/// Suffix of the sentinel object denoting a completed base backup.
pub const SENTINEL_SUFFIX: &str = "_backup_stop_sentinel.json";

/// Per-backup metadata object name, relative to `base_<name>/`.
pub const METADATA_NAME: &str = "metadata.json";

/// Placeholder WAL name for backups whose name embeds no valid segment.
pub const UNKNOWN_WAL_NAME: &str = "ZZZZZZZZZZZZZZZZZZZZZZZZ";

/// Join two relative storage paths, keeping exactly one separator between
/// them and a trailing separator when `rel` carries one.
pub fn join(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    let rel = rel.trim_start_matches('/');
    if base.is_empty() {
        rel.to_string()
    } else if rel.is_empty() {
        format!("{base}/")
    } else {
        format!("{base}/{rel}")
    }
}

/// Ensure a non-empty path ends with the separator.
pub fn with_delimiter(path: &str) -> String {
    if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}
