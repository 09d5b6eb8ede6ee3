//! WAL object name validation and backup-name helpers.
//!
//! Segment names arrive over the daemon socket; nothing that fails these
//! checks may reach the filesystem or the storage layer.

use walvault_common::paths::UNKNOWN_WAL_NAME;

/// Length of a WAL segment name: 8 hex chars each for timeline, log and
/// segment numbers.
const SEGMENT_NAME_LEN: usize = 24;

fn is_upper_hex(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// A plain WAL segment name, e.g. `000000010000000000000001`.
pub fn is_wal_segment_name(name: &str) -> bool {
    name.len() == SEGMENT_NAME_LEN && is_upper_hex(name)
}

/// Any object name the archive accepts for push or fetch: a segment, a
/// timeline history file, or a backup label.
pub fn is_valid_wal_object_name(name: &str) -> bool {
    if is_wal_segment_name(name) {
        return true;
    }
    if let Some(stem) = name.strip_suffix(".history") {
        return stem.len() == 8 && is_upper_hex(stem);
    }
    if let Some(stem) = name.strip_suffix(".backup") {
        // e.g. 000000010000000000000002.00000028.backup
        return match stem.split_once('.') {
            Some((segment, offset)) => {
                is_wal_segment_name(segment) && offset.len() == 8 && is_upper_hex(offset)
            }
            None => false,
        };
    }
    false
}

/// Derive the WAL file name embedded in a backup name, or the placeholder
/// when the name carries none (listings sort those last).
pub fn strip_wal_file_name(backup_name: &str) -> String {
    let candidate = backup_name
        .strip_prefix("base_")
        .unwrap_or(backup_name)
        .split('_')
        .next()
        .unwrap_or("");
    if is_wal_segment_name(candidate) {
        candidate.to_string()
    } else {
        UNKNOWN_WAL_NAME.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_names() {
        assert!(is_wal_segment_name("000000010000000000000001"));
        assert!(!is_wal_segment_name("00000001000000000000001"));
        assert!(!is_wal_segment_name("00000001000000000000000g"));
        assert!(!is_wal_segment_name("../../../../etc/passwd00"));
    }

    #[test]
    fn test_object_names() {
        assert!(is_valid_wal_object_name("000000010000000000000001"));
        assert!(is_valid_wal_object_name("00000002.history"));
        assert!(is_valid_wal_object_name(
            "000000010000000000000002.00000028.backup"
        ));
        assert!(!is_valid_wal_object_name("segment/../escape"));
        assert!(!is_valid_wal_object_name(""));
        assert!(!is_valid_wal_object_name("x.history"));
    }

    #[test]
    fn test_strip_wal_file_name() {
        assert_eq!(
            strip_wal_file_name("base_000000010000000000000002"),
            "000000010000000000000002"
        );
        assert_eq!(
            strip_wal_file_name("base_000000010000000000000002_D_000000010000000000000001"),
            "000000010000000000000002"
        );
        assert_eq!(strip_wal_file_name("base_111"), UNKNOWN_WAL_NAME);
    }
}
