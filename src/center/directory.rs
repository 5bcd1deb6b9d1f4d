//! Directory State
//!
//! The three metadata maps and the operations that mutate them. All methods
//! are synchronous; the service wraps the whole struct in one lock so every
//! operation lands atomically.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use super::protocol::Key;

/// Authoritative metadata: which worker holds which key, plus core counts.
///
/// `who_has` and `has_what` are exact inverses: `a ∈ who_has[k]` exactly when
/// `k ∈ has_what[a]`. Entries whose sets become empty are dropped; queries
/// answer absent keys and addresses with empty sets.
#[derive(Debug, Default)]
pub struct Directory {
    who_has: HashMap<Key, HashSet<SocketAddr>>,
    has_what: HashMap<SocketAddr, HashSet<Key>>,
    ncores: HashMap<SocketAddr, usize>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_pairing(&mut self, address: SocketAddr, key: Key) {
        self.who_has.entry(key.clone()).or_default().insert(address);
        self.has_what.entry(address).or_default().insert(key);
    }

    fn remove_pairing(&mut self, address: &SocketAddr, key: &Key) {
        if let Some(holders) = self.who_has.get_mut(key) {
            holders.remove(address);
            if holders.is_empty() {
                self.who_has.remove(key);
            }
        }

        if let Some(held) = self.has_what.get_mut(address) {
            held.remove(key);
            if held.is_empty() {
                self.has_what.remove(address);
            }
        }
    }

    /// Registers a worker: its held keys replace any previous claim and its
    /// core count is recorded.
    pub fn register(&mut self, address: SocketAddr, keys: Vec<Key>, ncores: usize) {
        let stale: Vec<Key> = self
            .has_what
            .get(&address)
            .map(|held| held.iter().filter(|k| !keys.contains(k)).cloned().collect())
            .unwrap_or_default();

        for key in stale {
            self.remove_pairing(&address, &key);
        }

        for key in keys {
            self.insert_pairing(address, key);
        }

        self.ncores.insert(address, ncores);
    }

    /// Removes a worker from every map. Returns false when the address was
    /// never seen, leaving the directory untouched.
    pub fn unregister(&mut self, address: &SocketAddr) -> bool {
        if !self.ncores.contains_key(address) && !self.has_what.contains_key(address) {
            return false;
        }

        if let Some(held) = self.has_what.remove(address) {
            for key in held {
                if let Some(holders) = self.who_has.get_mut(&key) {
                    holders.remove(address);
                    if holders.is_empty() {
                        self.who_has.remove(&key);
                    }
                }
            }
        }

        self.ncores.remove(address);
        true
    }

    /// Unions keys into a worker's claim. Idempotent; the worker does not
    /// need to be registered.
    pub fn add_keys(&mut self, address: SocketAddr, keys: Vec<Key>) {
        for key in keys {
            self.insert_pairing(address, key);
        }
    }

    /// Removes key pairings for a worker, tolerating ones that are already
    /// absent.
    pub fn remove_keys(&mut self, address: &SocketAddr, keys: &[Key]) {
        for key in keys {
            self.remove_pairing(address, key);
        }
    }

    /// Holder sets for the requested keys (absent keys answer with an empty
    /// set), or the full map.
    pub fn who_has(&self, keys: Option<&[Key]>) -> HashMap<Key, HashSet<SocketAddr>> {
        match keys {
            Some(keys) => keys
                .iter()
                .map(|key| {
                    let holders = self.who_has.get(key).cloned().unwrap_or_default();
                    (key.clone(), holders)
                })
                .collect(),
            None => self.who_has.clone(),
        }
    }

    /// Held keys for the requested addresses (absent addresses answer with an
    /// empty set), or the full map.
    pub fn has_what(&self, addresses: Option<&[SocketAddr]>) -> HashMap<SocketAddr, HashSet<Key>> {
        match addresses {
            Some(addresses) => addresses
                .iter()
                .map(|address| {
                    let held = self.has_what.get(address).cloned().unwrap_or_default();
                    (*address, held)
                })
                .collect(),
            None => self.has_what.clone(),
        }
    }

    /// Core counts for the requested addresses (unknown addresses are
    /// omitted), or the full map.
    pub fn ncores(&self, addresses: Option<&[SocketAddr]>) -> HashMap<SocketAddr, usize> {
        match addresses {
            Some(addresses) => addresses
                .iter()
                .filter_map(|address| self.ncores.get(address).map(|n| (*address, *n)))
                .collect(),
            None => self.ncores.clone(),
        }
    }

    /// Drops the given keys from the directory, returning for each former
    /// holder the keys it must delete locally.
    pub fn delete_keys(&mut self, keys: &[Key]) -> HashMap<SocketAddr, Vec<Key>> {
        let mut dropped: HashMap<SocketAddr, Vec<Key>> = HashMap::new();

        for key in keys {
            let Some(holders) = self.who_has.remove(key) else {
                continue;
            };

            for holder in holders {
                if let Some(held) = self.has_what.get_mut(&holder) {
                    held.remove(key);
                    if held.is_empty() {
                        self.has_what.remove(&holder);
                    }
                }
                dropped.entry(holder).or_default().push(key.clone());
            }
        }

        dropped
    }

    /// Number of keys with at least one holder.
    pub fn tracked_keys(&self) -> usize {
        self.who_has.len()
    }

    /// Number of registered workers.
    pub fn worker_count(&self) -> usize {
        self.ncores.len()
    }
}
