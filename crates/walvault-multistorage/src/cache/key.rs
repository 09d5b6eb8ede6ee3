//! Status cache keys.
//!
//! A key identifies one storage endpoint across processes: the configured
//! name plus a hash of the parameters that make two configs addressing the
//! same bucket nonetheless distinct.

use std::fmt;

/// Cache key of one storage endpoint. String form `<name>#<hash>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub name: String,
    pub hash: String,
}

impl StorageKey {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
        }
    }

    /// Parse the `<name>#<hash>` string form. A missing separator yields a
    /// key with an empty hash, so foreign entries in a shared cache file are
    /// preserved rather than dropped.
    pub fn parse(s: &str) -> Self {
        match s.split_once('#') {
            Some((name, hash)) => Self::new(name, hash),
            None => Self::new(s, ""),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.hash)
    }
}
