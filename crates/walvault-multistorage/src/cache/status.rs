//! Aliveness facts and the status map they live in.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::key::StorageKey;

/// One cached observation about a storage endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageStatus {
    pub alive: bool,
    pub checked_at: DateTime<Utc>,
    pub operation_weight_sum: i64,
}

impl StorageStatus {
    /// Fact produced by an explicit probe. Operation weights only accumulate
    /// from real operations, so a probe starts the sum over.
    pub fn from_probe(alive: bool, checked_at: DateTime<Utc>) -> Self {
        Self {
            alive,
            checked_at,
            operation_weight_sum: 0,
        }
    }

    /// Whether the fact is still within its TTL at `now`.
    pub fn is_relevant(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.checked_at);
        age <= chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
    }

    /// Fold the outcome of a real operation into the fact. A confirmation of
    /// the current state accumulates weight; a contradiction restarts it.
    pub fn apply_operation(prev: Option<Self>, alive: bool, weight: i64, now: DateTime<Utc>) -> Self {
        let weight_sum = match prev {
            Some(prev) if prev.alive == alive => prev.operation_weight_sum + weight,
            _ => weight,
        };
        Self {
            alive,
            checked_at: now,
            operation_weight_sum: weight_sum,
        }
    }
}

/// All facts this process knows, keyed by endpoint.
pub type StatusMap = BTreeMap<StorageKey, StorageStatus>;

/// Merge two maps: per key the later `checked_at` wins, ties prefer
/// `alive = true`. The winner's weight is kept; weights are opinions of one
/// process's workload, never summed across writers.
pub fn merge(a: &StatusMap, b: &StatusMap) -> StatusMap {
    let mut merged = a.clone();
    for (key, status) in b {
        match merged.get(key) {
            Some(existing)
                if existing.checked_at > status.checked_at
                    || (existing.checked_at == status.checked_at && existing.alive) => {}
            _ => {
                merged.insert(key.clone(), *status);
            }
        }
    }
    merged
}

/// Split the facts for `keys` into relevant and outdated by TTL. Keys with
/// no fact at all appear in neither map; they are implicitly unknown.
pub fn split_by_relevance(
    map: &StatusMap,
    ttl: Duration,
    keys: &[StorageKey],
    now: DateTime<Utc>,
) -> (StatusMap, StatusMap) {
    let mut relevant = StatusMap::new();
    let mut outdated = StatusMap::new();
    for key in keys {
        if let Some(status) = map.get(key) {
            if status.is_relevant(ttl, now) {
                relevant.insert(key.clone(), *status);
            } else {
                outdated.insert(key.clone(), *status);
            }
        }
    }
    (relevant, outdated)
}

/// Whether every requested key has a relevant fact.
pub fn all_relevant(map: &StatusMap, ttl: Duration, keys: &[StorageKey], now: DateTime<Utc>) -> bool {
    keys.iter().all(|key| {
        map.get(key)
            .is_some_and(|status| status.is_relevant(ttl, now))
    })
}

/// Project a status map to `name -> alive`.
pub fn alive_map(map: &StatusMap) -> std::collections::HashMap<String, bool> {
    map.iter()
        .map(|(key, status)| (key.name.clone(), status.alive))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_690_000_000 + secs, 0).unwrap()
    }

    fn status(alive: bool, secs: i64) -> StorageStatus {
        StorageStatus {
            alive,
            checked_at: at(secs),
            operation_weight_sum: 7,
        }
    }

    fn key(name: &str) -> StorageKey {
        StorageKey::new(name, "h")
    }

    #[test]
    fn test_merge_takes_later_fact() {
        let mut a = StatusMap::new();
        a.insert(key("s"), status(true, 0));
        let mut b = StatusMap::new();
        b.insert(key("s"), status(false, 10));

        let merged = merge(&a, &b);
        assert!(!merged[&key("s")].alive);
        assert_eq!(merged[&key("s")].checked_at, at(10));
    }

    #[test]
    fn test_merge_tie_prefers_alive() {
        let mut a = StatusMap::new();
        a.insert(key("s"), status(false, 5));
        let mut b = StatusMap::new();
        b.insert(key("s"), status(true, 5));

        assert!(merge(&a, &b)[&key("s")].alive);
        assert!(merge(&b, &a)[&key("s")].alive);
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let mut a = StatusMap::new();
        a.insert(key("x"), status(true, 1));
        a.insert(key("y"), status(false, 9));
        let mut b = StatusMap::new();
        b.insert(key("y"), status(true, 3));
        b.insert(key("z"), status(true, 2));
        let mut c = StatusMap::new();
        c.insert(key("x"), status(false, 8));

        assert_eq!(merge(&a, &b), merge(&b, &a));
        assert_eq!(merge(&a, &merge(&b, &c)), merge(&merge(&a, &b), &c));
    }

    #[test]
    fn test_merge_preserves_winner_weight() {
        let mut a = StatusMap::new();
        a.insert(
            key("s"),
            StorageStatus {
                alive: true,
                checked_at: at(0),
                operation_weight_sum: 100,
            },
        );
        let mut b = StatusMap::new();
        b.insert(
            key("s"),
            StorageStatus {
                alive: true,
                checked_at: at(10),
                operation_weight_sum: 3,
            },
        );
        // Later fact wins wholesale; weights are not summed across writers.
        assert_eq!(merge(&a, &b)[&key("s")].operation_weight_sum, 3);
    }

    #[test]
    fn test_split_by_relevance() {
        let ttl = Duration::from_secs(30);
        let mut map = StatusMap::new();
        map.insert(key("fresh"), status(true, 90));
        map.insert(key("stale"), status(true, 0));

        let keys = vec![key("fresh"), key("stale"), key("unknown")];
        let (relevant, outdated) = split_by_relevance(&map, ttl, &keys, at(100));
        assert!(relevant.contains_key(&key("fresh")));
        assert!(outdated.contains_key(&key("stale")));
        assert!(!relevant.contains_key(&key("unknown")));
        assert!(!outdated.contains_key(&key("unknown")));
    }

    #[test]
    fn test_apply_operation_accumulates_and_resets() {
        let first = StorageStatus::apply_operation(None, true, 3, at(0));
        assert_eq!(first.operation_weight_sum, 3);

        let confirmed = StorageStatus::apply_operation(Some(first), true, 1, at(1));
        assert_eq!(confirmed.operation_weight_sum, 4);
        assert_eq!(confirmed.checked_at, at(1));

        let contradicted = StorageStatus::apply_operation(Some(confirmed), false, 3, at(2));
        assert_eq!(contradicted.operation_weight_sum, 3);
        assert!(!contradicted.alive);
    }
}
