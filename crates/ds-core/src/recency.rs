//! Two-generation recency buffer (spec.md §3 "RecencyBuffer").

use std::collections::HashMap;
use std::hash::Hash;

/// Tracks a per-key value across two "generations" so that a periodic
/// `roll()` can age entries out without an explicit timestamp per key.
///
/// - `set(k, v)` always writes to `current`.
/// - `get(k)` looks in `current` first, falling back to `previous`.
/// - `refresh(k)` promotes a `previous` entry into `current` unchanged.
/// - `roll()` discards `previous` and demotes `current` into `previous`.
pub struct RecencyBuffer<K, V> {
    current: HashMap<K, V>,
    previous: HashMap<K, V>,
}

impl<K, V> Default for RecencyBuffer<K, V> {
    fn default() -> Self {
        Self {
            current: HashMap::new(),
            previous: HashMap::new(),
        }
    }
}

impl<K, V> RecencyBuffer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: K, value: V) {
        self.current.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.current.get(key).or_else(|| self.previous.get(key))
    }

    /// Promote a `previous`-only entry into `current`, leaving its value
    /// unchanged. No-op if the key is already in `current` or absent from
    /// `previous`.
    pub fn refresh(&mut self, key: &K) {
        if self.current.contains_key(key) {
            return;
        }
        if let Some(v) = self.previous.get(key) {
            self.current.insert(key.clone(), v.clone());
        }
    }

    /// Discard `previous` and demote `current` into `previous`.
    pub fn roll(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }

    pub fn is_defined(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}
