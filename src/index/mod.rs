//! EntriesIndex - the shared map of relative path -> EntryInfo.
//!
//! A single mutex-guarded map, mutated only through short, non-blocking
//! closures.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::EntryInfo;

/// The main data structure of the engine: a mutex-guarded map from relative
/// path to that path's `(src, copy, op)` observation.
///
/// The map is reachable only through the methods below; no reference to an
/// internal entry ever escapes the lock.
pub struct EntriesIndex {
    map: Mutex<HashMap<String, EntryInfo>>,
}

impl EntriesIndex {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Reset both sides of every entry to absent, ahead of a new scan cycle.
    pub fn prepare_for_scan(&self) {
        let mut map = self.map.lock().unwrap();
        for entry in map.values_mut() {
            entry.src.exists = false;
            entry.copy.exists = false;
        }
    }

    /// Load the entry for `key` (zero-value if absent), apply `mutator` to it
    /// under the lock, then store it back. `mutator` must be short and must
    /// not perform I/O.
    pub fn update(&self, key: &str, mutator: impl FnOnce(&mut EntryInfo)) {
        let mut map = self.map.lock().unwrap();
        let mut entry = map.remove(key).unwrap_or_default();
        mutator(&mut entry);
        map.insert(key.to_string(), entry);
    }

    /// Replace the entry for `key` wholesale.
    pub fn set(&self, key: &str, value: EntryInfo) {
        let mut map = self.map.lock().unwrap();
        map.insert(key.to_string(), value);
    }

    /// Read a clone of the entry for `key`, if present.
    pub fn get(&self, key: &str) -> Option<EntryInfo> {
        let map = self.map.lock().unwrap();
        map.get(key).cloned()
    }

    /// Drop every entry whose two observations are both absent and which
    /// carries no pending operation; such entries are collectable garbage.
    pub fn remove_obsolete(&self) {
        let mut map = self.map.lock().unwrap();
        map.retain(|_, entry| entry.src.exists || entry.copy.exists || entry.op.is_some());
    }

    /// Invoke `visitor(key, entry)` for every entry under the lock. The
    /// visitor may mutate the entry in place. Short-circuits on the first
    /// `Err` the visitor returns.
    pub fn for_each<E>(
        &self,
        mut visitor: impl FnMut(&str, &mut EntryInfo) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut map = self.map.lock().unwrap();
        for (key, entry) in map.iter_mut() {
            visitor(key, entry)?;
        }
        Ok(())
    }

    /// Number of entries currently tracked. Exposed for tests and metrics.
    pub fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EntriesIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PathInfo;
    use std::path::PathBuf;

    #[test]
    fn update_creates_zero_value_entry_when_absent() {
        let index = EntriesIndex::new();
        index.update("a/b.txt", |entry| {
            entry.src = PathInfo::file(PathBuf::from("/src/a/b.txt"), 4, std::time::SystemTime::UNIX_EPOCH);
        });
        let entry = index.get("a/b.txt").unwrap();
        assert!(entry.src.exists);
        assert!(!entry.copy.exists);
    }

    #[test]
    fn prepare_for_scan_resets_existence_on_both_sides() {
        let index = EntriesIndex::new();
        index.update("a.txt", |entry| {
            entry.src = PathInfo::file(PathBuf::from("/src/a.txt"), 1, std::time::SystemTime::UNIX_EPOCH);
            entry.copy = PathInfo::file(PathBuf::from("/copy/a.txt"), 1, std::time::SystemTime::UNIX_EPOCH);
        });
        index.prepare_for_scan();
        let entry = index.get("a.txt").unwrap();
        assert!(!entry.src.exists);
        assert!(!entry.copy.exists);
    }

    #[test]
    fn remove_obsolete_drops_fully_absent_entries_without_pending_op() {
        let index = EntriesIndex::new();
        index.update("gone.txt", |_entry| {});
        assert_eq!(index.len(), 1);
        index.remove_obsolete();
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn remove_obsolete_keeps_entries_with_a_pending_op() {
        use crate::types::{Operation, OperationKind};
        let index = EntriesIndex::new();
        index.update("pending.txt", |entry| {
            entry.op = Some(Operation::new(OperationKind::RemoveFile));
        });
        index.remove_obsolete();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_obsolete_keeps_entries_still_present_on_either_side() {
        let index = EntriesIndex::new();
        index.update("a.txt", |entry| {
            entry.src = PathInfo::dir(PathBuf::from("/src/a"));
        });
        index.remove_obsolete();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn for_each_can_mutate_entries_and_short_circuits_on_error() {
        let index = EntriesIndex::new();
        index.update("a.txt", |_| {});
        index.update("b.txt", |_| {});

        let mut seen = Vec::new();
        let result: Result<(), &'static str> = index.for_each(|key, entry| {
            seen.push(key.to_string());
            entry.op = None;
            if key == "a.txt" {
                Err("stop")
            } else {
                Ok(())
            }
        });

        assert!(result.is_err());
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn set_replaces_the_entry_wholesale() {
        let index = EntriesIndex::new();
        index.update("a.txt", |entry| {
            entry.src = PathInfo::dir(PathBuf::from("/src/a"));
        });
        index.set("a.txt", EntryInfo::default());
        let entry = index.get("a.txt").unwrap();
        assert!(!entry.src.exists);
    }
}
