//! Routing policies attached to multi-storage folder handles.

/// Which subset of endpoints each folder operation touches.
///
/// Attached to a handle, never persisted; changing the policy yields a new
/// handle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Policy {
    /// Route everything to the first alive storage, in configured order.
    #[default]
    FirstAlive,
    /// Read from the first storage that has the object, write to every alive
    /// storage, list the first alive one.
    AllAlive,
    /// Pin every operation to one named storage.
    Specific(String),
    /// Read from whichever storage has the object, broadcast writes, and
    /// list the union across storages with per-storage tagging.
    UniteAll,
}

impl Policy {
    /// Whether writes fan out to every resolved storage.
    pub fn broadcasts_writes(&self) -> bool {
        matches!(self, Policy::AllAlive | Policy::UniteAll)
    }

    /// Whether reads fall through to later storages on a miss.
    pub fn reads_fall_through(&self) -> bool {
        matches!(self, Policy::AllAlive | Policy::UniteAll)
    }
}
