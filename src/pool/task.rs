//! Task Types and Result Handles
//!
//! What a submission looks like and what the caller gets back: a task spec
//! going in, a two-stage handle coming out. Stage one resolves when the
//! worker acked the computation; stage two fetches the stored value.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use tokio::sync::watch;

use crate::center::protocol::{CenterOp, CenterReply, Key};
use crate::rpc::client::send_recv;
use crate::worker::protocol::{TaskArg, WorkerOp, WorkerReply};

/// A compute call to submit: function name plus tagged arguments.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub function: String,
    pub args: Vec<TaskArg>,
    pub kwargs: HashMap<String, TaskArg>,
}

impl TaskSpec {
    pub fn call(function: &str, args: Vec<TaskArg>) -> Self {
        Self {
            function: function.to_string(),
            args,
            kwargs: HashMap::new(),
        }
    }

    pub fn kwarg(mut self, name: &str, arg: TaskArg) -> Self {
        self.kwargs.insert(name.to_string(), arg);
        self
    }

    /// Keys of every `Ref` argument, the task's dependency set.
    pub fn needed(&self) -> HashSet<Key> {
        self.args
            .iter()
            .chain(self.kwargs.values())
            .filter_map(|arg| match arg {
                TaskArg::Ref { key } => Some(key.clone()),
                TaskArg::Literal { .. } => None,
            })
            .collect()
    }
}

/// Progress of one submitted task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    /// Accepted by the pool, not yet sent anywhere.
    Submitted,
    /// Compute RPC sent to the chosen worker.
    Dispatched { worker: SocketAddr },
    /// Worker finished and acked; the result value lives on `worker`.
    Completed { worker: SocketAddr },
    /// Dispatch or execution failed.
    Failed { error: String },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Failed { .. })
    }
}

/// Client-side handle for one submitted task.
///
/// `state` is a non-blocking poll; `started` waits for stage one and yields
/// the [`RemoteData`] handle whose `get` performs the stage-two fetch.
#[derive(Debug)]
pub struct TaskHandle {
    key: Key,
    center: SocketAddr,
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(key: Key, center: SocketAddr, state: watch::Receiver<TaskState>) -> Self {
        Self { key, center, state }
    }

    /// Result key this task stores its value under.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Argument referencing this task's result, for dependent submissions.
    pub fn output_ref(&self) -> TaskArg {
        TaskArg::Ref {
            key: self.key.clone(),
        }
    }

    /// Non-blocking look at the current task state.
    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Waits until the worker acked the computation (stage one) and returns
    /// the handle for fetching the stored value (stage two).
    pub async fn started(&self) -> Result<RemoteData> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(TaskState::is_terminal)
            .await
            .map_err(|_| anyhow!("Pool dropped task {} before it finished", self.key))?
            .clone();

        match state {
            TaskState::Completed { worker } => {
                Ok(RemoteData::new(self.key.clone(), Some(worker), self.center))
            }
            TaskState::Failed { error } => Err(anyhow!("Task {} failed: {}", self.key, error)),
            other => bail!("Task {} still {:?} after terminal wait", self.key, other),
        }
    }
}

/// Handle to one stored value somewhere in the cluster.
#[derive(Debug)]
pub struct RemoteData {
    key: Key,
    holder: Option<SocketAddr>,
    center: SocketAddr,
}

impl RemoteData {
    pub(crate) fn new(key: Key, holder: Option<SocketAddr>, center: SocketAddr) -> Self {
        Self {
            key,
            holder,
            center,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Fetches the value from its holder. When no holder is recorded, the
    /// center is asked for one first. Repeated calls re-fetch.
    pub async fn get(&self) -> Result<Value> {
        let holder = match self.holder {
            Some(holder) => holder,
            None => self.lookup_holder().await?,
        };

        let reply: WorkerReply = send_recv(
            holder,
            WorkerOp::GetData {
                keys: vec![self.key.clone()],
            },
        )
        .await
        .with_context(|| format!("Failed to fetch {} from {}", self.key, holder))?;

        match reply {
            WorkerReply::Data { mut entries } => entries
                .remove(&self.key)
                .ok_or_else(|| anyhow!("Holder {} no longer has key {}", holder, self.key)),
            other => bail!("Unexpected get-data reply from {}: {:?}", holder, other),
        }
    }

    async fn lookup_holder(&self) -> Result<SocketAddr> {
        let reply: CenterReply = send_recv(
            self.center,
            CenterOp::WhoHas {
                keys: Some(vec![self.key.clone()]),
            },
        )
        .await
        .context("who-has lookup failed")?;

        let holders = match reply {
            CenterReply::WhoHas { holders } => holders,
            other => bail!("Unexpected who-has reply: {:?}", other),
        };

        holders
            .get(&self.key)
            .and_then(|set| set.iter().next().copied())
            .ok_or_else(|| anyhow!("No holder known for key {}", self.key))
    }
}
