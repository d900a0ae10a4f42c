//! Watch table for inbound routing.
//!
//! Maps `(type, name)` to whatever the caller wants to route inbound
//! values to. Two resources with the same name but different types are
//! distinct entries.

use std::collections::HashMap;

/// Two-level `type → name → T` table.
#[derive(Debug, Clone)]
pub struct WatchTable<T> {
    by_type: HashMap<String, HashMap<String, T>>,
}

impl<T> WatchTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }

    /// Insert only if `(type, name)` is not already watched.
    ///
    /// Returns `true` if the entry was inserted.
    pub fn watch_new(&mut self, type_name: &str, name: &str, item: T) -> bool {
        let names = self.by_type.entry(type_name.to_string()).or_default();
        if names.contains_key(name) {
            return false;
        }
        names.insert(name.to_string(), item);
        true
    }

    /// Insert or replace the entry for `(type, name)`.
    ///
    /// Returns the previous entry, if any.
    pub fn watch(&mut self, type_name: &str, name: &str, item: T) -> Option<T> {
        self.by_type
            .entry(type_name.to_string())
            .or_default()
            .insert(name.to_string(), item)
    }

    /// Look up the entry for `(type, name)`.
    pub fn get(&self, type_name: &str, name: &str) -> Option<&T> {
        self.by_type.get(type_name)?.get(name)
    }

    /// Check whether `(type, name)` is watched.
    pub fn contains(&self, type_name: &str, name: &str) -> bool {
        self.get(type_name, name).is_some()
    }

    /// Remove the entry for `(type, name)`.
    pub fn unwatch(&mut self, type_name: &str, name: &str) -> Option<T> {
        let names = self.by_type.get_mut(type_name)?;
        let removed = names.remove(name);
        if names.is_empty() {
            self.by_type.remove(type_name);
        }
        removed
    }

    /// Total number of watched entries.
    pub fn len(&self) -> usize {
        self.by_type.values().map(HashMap::len).sum()
    }

    /// Check if nothing is watched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for WatchTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_new_is_idempotent() {
        let mut table = WatchTable::new();

        assert!(table.watch_new("note", "todo", 1));
        assert!(!table.watch_new("note", "todo", 2));

        assert_eq!(table.get("note", "todo"), Some(&1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn watch_replaces() {
        let mut table = WatchTable::new();
        table.watch("note", "todo", 1);

        let previous = table.watch("note", "todo", 2);

        assert_eq!(previous, Some(1));
        assert_eq!(table.get("note", "todo"), Some(&2));
    }

    #[test]
    fn type_and_name_are_both_keys() {
        let mut table = WatchTable::new();
        table.watch("note", "todo", 1);
        table.watch("list", "todo", 2);

        assert_eq!(table.get("note", "todo"), Some(&1));
        assert_eq!(table.get("list", "todo"), Some(&2));
        assert!(!table.contains("other", "todo"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn unwatch_removes_entry() {
        let mut table = WatchTable::new();
        table.watch("note", "todo", 1);

        assert_eq!(table.unwatch("note", "todo"), Some(1));
        assert_eq!(table.unwatch("note", "todo"), None);
        assert!(table.is_empty());
    }
}
