//! Cache Store Module
//!
//! Nested storage: group key to entry key to stored entry.

use rustc_hash::FxHashMap;

use crate::cache::{CacheEntry, EntryKey, GroupKey};

// == Cache Store ==
/// Two-level map of cached entries.
#[derive(Debug, Default)]
pub struct CacheStore {
    groups: FxHashMap<GroupKey, FxHashMap<EntryKey, CacheEntry>>,
}

impl CacheStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Lookup ==
    /// Returns the entry for `(key1, key2)` without side effects.
    pub fn lookup(&self, key1: &GroupKey, key2: &EntryKey) -> Option<&CacheEntry> {
        self.groups.get(key1).and_then(|group| group.get(key2))
    }

    // == Store ==
    /// Inserts or overwrites an entry, creating its group if needed.
    pub fn store(&mut self, key1: GroupKey, key2: EntryKey, entry: CacheEntry) {
        self.groups.entry(key1).or_default().insert(key2, entry);
    }

    // == Remove Group ==
    /// Removes a whole group. Returns whether it existed.
    pub fn remove_group(&mut self, key1: &GroupKey) -> bool {
        self.groups.remove(key1).is_some()
    }

    // == Remove Entry ==
    /// Removes a single entry. An emptied group is left in place; see
    /// [`CacheStore::prune_if_empty`].
    pub fn remove_entry(&mut self, key1: &GroupKey, key2: &EntryKey) -> bool {
        self.groups
            .get_mut(key1)
            .map(|group| group.remove(key2).is_some())
            .unwrap_or(false)
    }

    /// Drops `key1` if it has no entries. Returns whether it was dropped.
    pub fn prune_if_empty(&mut self, key1: &GroupKey) -> bool {
        if self.groups.get(key1).is_some_and(|group| group.is_empty()) {
            self.groups.remove(key1);
            true
        } else {
            false
        }
    }

    pub fn contains_group(&self, key1: &GroupKey) -> bool {
        self.groups.contains_key(key1)
    }

    /// Number of entries in `key1`, or 0 if the group is absent.
    pub fn group_len(&self, key1: &GroupKey) -> usize {
        self.groups.get(key1).map_or(0, |group| group.len())
    }

    /// Number of groups, including empty ones awaiting a timer.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    // == Length ==
    /// Total number of entries across all groups.
    pub fn len(&self) -> usize {
        self.groups.values().map(|group| group.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
