//! Local Data Store
//!
//! In-memory key -> value storage owned by one worker. Values are structured
//! JSON; the store is only ever mutated through its own worker's handlers.

use std::collections::HashMap;

use dashmap::DashMap;
use serde_json::Value;

use crate::center::protocol::Key;

#[derive(Debug, Default)]
pub struct DataStore {
    entries: DashMap<Key, Value>,
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, key: Key, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &Key) {
        self.entries.remove(key);
    }

    /// Sub-map of the requested keys that are actually present.
    pub fn get_many(&self, keys: &[Key]) -> HashMap<Key, Value> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    pub fn extend(&self, data: HashMap<Key, Value>) {
        for (key, value) in data {
            self.entries.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn held_keys(&self) -> Vec<Key> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}
