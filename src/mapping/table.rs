//! Mapping implementation
//!
//! HashMap keyed by the folded key, holding the original spelling.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use bytes::Bytes;

use super::KeyComparison;

/// A stored key/value pair. `key` is the spelling first inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    key: String,
    value: Bytes,
}

/// In-memory key → value table with a fixed comparison mode
#[derive(Debug, Clone)]
pub struct Mapping {
    comparison: KeyComparison,
    entries: HashMap<String, Slot>,
}

impl Mapping {
    /// Create an empty table
    pub fn new(comparison: KeyComparison) -> Self {
        Self {
            comparison,
            entries: HashMap::new(),
        }
    }

    /// Create an empty table sized for `capacity` entries
    pub fn with_capacity(comparison: KeyComparison, capacity: usize) -> Self {
        Self {
            comparison,
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn comparison(&self) -> KeyComparison {
        self.comparison
    }

    /// Look up a value
    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries
            .get(self.comparison.fold(key).as_ref())
            .map(|slot| &slot.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(self.comparison.fold(key).as_ref())
    }

    /// Insert or overwrite. Returns the previous value.
    ///
    /// On overwrite the stored spelling is kept.
    pub fn insert(&mut self, key: impl Into<String>, value: Bytes) -> Option<Bytes> {
        let key = key.into();
        let folded = self.comparison.fold(&key).into_owned();

        match self.entries.entry(folded) {
            Entry::Occupied(mut occupied) => {
                Some(std::mem::replace(&mut occupied.get_mut().value, value))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot { key, value });
                None
            }
        }
    }

    /// Insert only if absent. Returns false if the key already existed.
    pub fn try_insert(&mut self, key: impl Into<String>, value: Bytes) -> bool {
        let key = key.into();
        let folded = self.comparison.fold(&key).into_owned();

        match self.entries.entry(folded) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Slot { key, value });
                true
            }
        }
    }

    /// Remove a key. Returns the removed value.
    pub fn remove(&mut self, key: &str) -> Option<Bytes> {
        self.entries
            .remove(self.comparison.fold(key).as_ref())
            .map(|slot| slot.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored spellings of all keys (unordered)
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|slot| slot.key.as_str())
    }

    /// All entries as (stored key, value), unordered
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.entries
            .values()
            .map(|slot| (slot.key.as_str(), &slot.value))
    }
}

impl Default for Mapping {
    fn default() -> Self {
        Self::new(KeyComparison::Ordinal)
    }
}

/// Equal when both hold the same entries under the same comparison mode.
/// Key spelling is not compared in ignore-case mode.
impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        if self.comparison != other.comparison || self.len() != other.len() {
            return false;
        }
        self.entries.iter().all(|(folded, slot)| {
            other
                .entries
                .get(folded)
                .is_some_and(|theirs| theirs.value == slot.value)
        })
    }
}

impl Eq for Mapping {}
