//! Worker Wire Protocol
//!
//! Defines the operations a worker serves and the replies it produces. The
//! compute operation carries its arguments as explicit [`TaskArg`] values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::center::protocol::Key;

/// One argument of a compute call, tagged by the submitter.
///
/// A `Ref` names a key whose value must be local or fetched before the
/// function runs; a `Literal` passes through untouched. There is no lookup
/// fallback: a literal that happens to spell an existing key name stays a
/// literal, and a `Ref` to an unknown key is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskArg {
    Literal { value: Value },
    Ref { key: Key },
}

impl TaskArg {
    pub fn literal(value: impl Into<Value>) -> Self {
        TaskArg::Literal {
            value: value.into(),
        }
    }

    pub fn reference(key: impl Into<Key>) -> Self {
        TaskArg::Ref { key: key.into() }
    }
}

/// Operations served by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum WorkerOp {
    /// Run a named function and store its result under `key`.
    Compute {
        function: String,
        key: Key,
        #[serde(default)]
        args: Vec<TaskArg>,
        #[serde(default)]
        kwargs: HashMap<String, TaskArg>,
        #[serde(default)]
        needed: Vec<Key>,
    },
    /// Read locally held values; absent keys are left out of the reply.
    GetData { keys: Vec<Key> },
    /// Write values into the local store.
    UpdateData { data: HashMap<Key, Value> },
    /// Drop values from the local store, tolerating absent keys.
    DelData { keys: Vec<Key> },
}

/// Replies produced by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum WorkerReply {
    Ok,
    Error { message: String },
    Data { entries: HashMap<Key, Value> },
}
