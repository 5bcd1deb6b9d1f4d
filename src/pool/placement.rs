//! Locality Placement
//!
//! Decides where tasks could run entirely from local data. Locality is kept
//! separate from load on purpose: this module answers "which workers already
//! hold everything this task needs", and the pool breaks ties by spare
//! capacity afterwards.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use crate::center::protocol::Key;

/// Splits a batch of tasks by data locality.
///
/// `who_has` maps dependency keys to their holders; `needed` maps task ids
/// to required key sets. The result is `shares` (worker -> ids of tasks fully
/// runnable from that worker's data, in ascending id order) and `extra` (ids
/// with no single fully-local worker). Tasks with an empty needed set have
/// no locality preference and always land in `extra`.
pub fn divide_tasks(
    who_has: &HashMap<Key, HashSet<SocketAddr>>,
    needed: &HashMap<usize, HashSet<Key>>,
) -> (HashMap<SocketAddr, Vec<usize>>, HashSet<usize>) {
    let mut held_by: HashMap<SocketAddr, HashSet<Key>> = HashMap::new();
    for (key, holders) in who_has {
        for holder in holders {
            held_by.entry(*holder).or_default().insert(key.clone());
        }
    }

    let mut task_ids: Vec<usize> = needed.keys().copied().collect();
    task_ids.sort_unstable();

    let mut shares: HashMap<SocketAddr, Vec<usize>> = HashMap::new();
    let mut extra: HashSet<usize> = HashSet::new();

    for task in task_ids {
        let required = &needed[&task];
        if required.is_empty() {
            extra.insert(task);
            continue;
        }

        let mut placed = false;
        for (worker, held) in &held_by {
            if required.is_subset(held) {
                shares.entry(*worker).or_default().push(task);
                placed = true;
            }
        }

        if !placed {
            extra.insert(task);
        }
    }

    (shares, extra)
}
