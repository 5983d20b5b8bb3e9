//! Per-kind handle pools.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::registry::handle::HandleEntry;
use crate::registry::key::ConfigKey;
use crate::registry::value::ConfigValue;

/// Ordered multi-map of `ConfigKey` to every handle registered under it.
///
/// Duplicate keys are legal (several call sites sharing one setting) and all
/// of them resolve to the same slot.
pub struct TypedPool<T: ConfigValue> {
    entries: RwLock<BTreeMap<ConfigKey, Vec<Arc<HandleEntry<T>>>>>,
}

impl<T: ConfigValue> TypedPool<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn insert(&self, entry: Arc<HandleEntry<T>>) {
        let mut entries = self.entries.write().expect("registry pool lock poisoned");
        entries.entry(entry.key().clone()).or_default().push(entry);
    }

    /// Remove the exact handle `id` registered under `key`.
    /// Returns false when no such handle exists.
    pub(crate) fn remove(&self, key: &ConfigKey, id: u64) -> bool {
        let mut entries = self.entries.write().expect("registry pool lock poisoned");
        let Some(handles) = entries.get_mut(key) else {
            return false;
        };
        let before = handles.len();
        handles.retain(|h| h.id() != id);
        let removed = handles.len() != before;
        if handles.is_empty() {
            entries.remove(key);
        }
        removed
    }

    pub fn contains_key(&self, key: &ConfigKey) -> bool {
        self.entries
            .read()
            .expect("registry pool lock poisoned")
            .contains_key(key)
    }

    /// Distinct keys in sorted order.
    pub fn keys(&self) -> Vec<ConfigKey> {
        self.entries
            .read()
            .expect("registry pool lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Number of registered handles, duplicates included.
    pub fn handle_count(&self) -> usize {
        self.entries
            .read()
            .expect("registry pool lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    /// The first handle of every distinct key, in key order.
    pub(crate) fn representatives(&self) -> Vec<Arc<HandleEntry<T>>> {
        self.entries
            .read()
            .expect("registry pool lock poisoned")
            .values()
            .filter_map(|handles| handles.first().cloned())
            .collect()
    }

    pub(crate) fn representative(&self, key: &ConfigKey) -> Option<Arc<HandleEntry<T>>> {
        self.entries
            .read()
            .expect("registry pool lock poisoned")
            .get(key)
            .and_then(|handles| handles.first().cloned())
    }

    /// Record the compiled slot on every handle sharing each key.
    pub(crate) fn assign_slots(&self, slots: &BTreeMap<ConfigKey, usize>) {
        let entries = self.entries.read().expect("registry pool lock poisoned");
        for (key, handles) in entries.iter() {
            if let Some(&slot) = slots.get(key) {
                for handle in handles {
                    handle.assign_slot(slot);
                }
            }
        }
    }
}
