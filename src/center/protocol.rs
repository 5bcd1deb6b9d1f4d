//! Center Wire Protocol
//!
//! Defines the operations accepted by the directory service and the replies
//! it produces, plus the [`Key`] identifier every node uses to name data
//! items. Operations travel inside the RPC envelope; the `op` tag values
//! below are the protocol's operation names.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Identifier of one data item. Keys are opaque strings; generated result
/// keys are UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(pub String);

impl Key {
    /// Generates a fresh unique key.
    pub fn new() -> Self {
        Key(uuid::Uuid::new_v4().to_string())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operations served by the center.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum CenterOp {
    /// Announce a worker, overwriting any previous registration.
    Register {
        address: SocketAddr,
        #[serde(default)]
        keys: Vec<Key>,
        ncores: usize,
    },
    /// Remove a worker and every key pairing it appears in.
    Unregister { address: SocketAddr },
    /// Record that a worker now holds these keys.
    AddKeys { address: SocketAddr, keys: Vec<Key> },
    /// Record that a worker no longer holds these keys.
    RemoveKeys { address: SocketAddr, keys: Vec<Key> },
    /// Query holder sets, filtered to `keys` or the full map.
    WhoHas {
        #[serde(default)]
        keys: Option<Vec<Key>>,
    },
    /// Query held keys, filtered to `addresses` or the full map.
    HasWhat {
        #[serde(default)]
        addresses: Option<Vec<SocketAddr>>,
    },
    /// Query registered core counts, filtered to `addresses` or the full map.
    Ncores {
        #[serde(default)]
        addresses: Option<Vec<SocketAddr>>,
    },
    /// Drop keys from the directory and from every holding worker.
    DeleteData { keys: Vec<Key> },
    /// Stop accepting connections, draining the in-flight ones.
    Terminate,
}

/// Replies produced by the center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CenterReply {
    Ok,
    Error { message: String },
    WhoHas { holders: HashMap<Key, HashSet<SocketAddr>> },
    HasWhat { held: HashMap<SocketAddr, HashSet<Key>> },
    Ncores { cores: HashMap<SocketAddr, usize> },
}
