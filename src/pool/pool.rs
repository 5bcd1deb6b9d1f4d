//! Client-Side Scheduler
//!
//! The pool turns submissions into placed, dispatched compute RPCs. It keeps
//! the only load signal in the system: a per-worker count of free slots,
//! seeded from the center's `ncores` and mutated on dispatch and completion.
//! Nothing on the worker enforces the cap; staying within it is this
//! ledger's job.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::{Mutex, watch};
use tracing::info;

use super::placement::divide_tasks;
use super::task::{TaskHandle, TaskSpec, TaskState};
use crate::center::protocol::{CenterOp, CenterReply, Key};
use crate::rpc::client::send_recv;
use crate::worker::protocol::{TaskArg, WorkerOp, WorkerReply};

/// Per-worker capacity ledger: registered cores plus the live estimate of
/// free slots. Decrements saturate at zero and increments clamp at the
/// registered count, so the estimate stays inside its soft bounds even when
/// the cluster is oversubscribed.
#[derive(Debug, Default)]
pub(crate) struct CoreLedger {
    ncores: HashMap<SocketAddr, usize>,
    available: HashMap<SocketAddr, usize>,
}

impl CoreLedger {
    /// Folds in a fresh ncores snapshot. Newly seen workers start with all
    /// slots free; workers already tracked keep their in-flight accounting;
    /// workers gone from the snapshot are dropped.
    pub(crate) fn sync(&mut self, snapshot: HashMap<SocketAddr, usize>) {
        for (worker, cores) in &snapshot {
            if !self.ncores.contains_key(worker) {
                self.available.insert(*worker, *cores);
            }
        }
        self.available.retain(|worker, _| snapshot.contains_key(worker));
        self.ncores = snapshot;
    }

    pub(crate) fn workers(&self) -> Vec<SocketAddr> {
        self.ncores.keys().copied().collect()
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.ncores.len()
    }

    pub(crate) fn available(&self) -> HashMap<SocketAddr, usize> {
        self.available.clone()
    }

    pub(crate) fn registered(&self) -> HashMap<SocketAddr, usize> {
        self.ncores.clone()
    }

    /// Picks the candidate with the most free slots and takes one.
    pub(crate) fn take_slot(&mut self, candidates: &[SocketAddr]) -> Option<SocketAddr> {
        let chosen = candidates
            .iter()
            .max_by_key(|worker| self.available.get(worker).copied().unwrap_or(0))
            .copied()?;

        let slot = self.available.entry(chosen).or_insert(0);
        *slot = slot.saturating_sub(1);

        Some(chosen)
    }

    /// Returns one slot, clamped to the registered core count.
    pub(crate) fn release_slot(&mut self, worker: SocketAddr) {
        let cap = self.ncores.get(&worker).copied().unwrap_or(0);
        let slot = self.available.entry(worker).or_insert(0);
        *slot = (*slot + 1).min(cap);
    }
}

/// Client-side scheduler: places tasks where their inputs already live and
/// tracks per-worker free slots.
pub struct Pool {
    center: SocketAddr,
    ledger: Arc<Mutex<CoreLedger>>,
}

impl Pool {
    /// Connects to a center and seeds the capacity ledger from its ncores.
    pub async fn connect(center: SocketAddr) -> Result<Self> {
        let pool = Self {
            center,
            ledger: Arc::new(Mutex::new(CoreLedger::default())),
        };
        pool.sync().await?;
        Ok(pool)
    }

    /// Center this pool schedules against.
    pub fn center(&self) -> SocketAddr {
        self.center
    }

    /// Refreshes the worker set and core counts from the center.
    pub async fn sync(&self) -> Result<()> {
        let reply: CenterReply = send_recv(self.center, CenterOp::Ncores { addresses: None })
            .await
            .context("Failed to sync ncores from center")?;

        let cores = match reply {
            CenterReply::Ncores { cores } => cores,
            other => bail!("Unexpected ncores reply: {:?}", other),
        };

        let mut ledger = self.ledger.lock().await;
        ledger.sync(cores);
        info!(
            "Synced {} worker(s) from center {}",
            ledger.worker_count(),
            self.center
        );

        Ok(())
    }

    /// Current free-slot estimate per worker.
    pub async fn available_cores(&self) -> HashMap<SocketAddr, usize> {
        self.ledger.lock().await.available()
    }

    /// Registered core counts as of the last sync.
    pub async fn ncores(&self) -> HashMap<SocketAddr, usize> {
        self.ledger.lock().await.registered()
    }

    /// Holder sets for the given keys, or the full directory.
    pub async fn who_has(
        &self,
        keys: Option<Vec<Key>>,
    ) -> Result<HashMap<Key, HashSet<SocketAddr>>> {
        let reply: CenterReply = send_recv(self.center, CenterOp::WhoHas { keys }).await?;
        match reply {
            CenterReply::WhoHas { holders } => Ok(holders),
            other => bail!("Unexpected who-has reply: {:?}", other),
        }
    }

    /// Asks the center to stop accepting connections.
    pub async fn terminate_center(&self) -> Result<()> {
        let reply: CenterReply = send_recv(self.center, CenterOp::Terminate).await?;
        match reply {
            CenterReply::Ok => Ok(()),
            other => bail!("Unexpected terminate reply: {:?}", other),
        }
    }

    /// Submits one task and returns its handle.
    pub async fn submit(&self, spec: TaskSpec) -> Result<TaskHandle> {
        let mut handles = self.submit_batch(vec![spec]).await?;
        match handles.pop() {
            Some(handle) => Ok(handle),
            None => bail!("Batch submission returned no handle"),
        }
    }

    /// Applies one function to each input, one task per element. The whole
    /// batch is placed in a single pass so tasks sharing dependencies
    /// co-locate.
    pub async fn map(&self, function: &str, inputs: Vec<TaskArg>) -> Result<Vec<TaskHandle>> {
        let specs = inputs
            .into_iter()
            .map(|arg| TaskSpec::call(function, vec![arg]))
            .collect();
        self.submit_batch(specs).await
    }

    /// Places and dispatches a batch of tasks, returning one handle per
    /// task in submission order.
    pub async fn submit_batch(&self, specs: Vec<TaskSpec>) -> Result<Vec<TaskHandle>> {
        let needed: HashMap<usize, HashSet<Key>> = specs
            .iter()
            .enumerate()
            .map(|(id, spec)| (id, spec.needed()))
            .collect();

        // One who-has query covers every dependency in the batch.
        let dep_keys: HashSet<Key> = needed.values().flatten().cloned().collect();
        let who_has = if dep_keys.is_empty() {
            HashMap::new()
        } else {
            self.who_has(Some(dep_keys.into_iter().collect())).await?
        };

        let (shares, extra) = divide_tasks(&who_has, &needed);

        let mut candidates: HashMap<usize, Vec<SocketAddr>> = HashMap::new();
        for (worker, tasks) in &shares {
            for task in tasks {
                candidates.entry(*task).or_default().push(*worker);
            }
        }

        let mut ledger = self.ledger.lock().await;
        let all_workers = ledger.workers();
        if all_workers.is_empty() {
            bail!("No workers registered with center {}", self.center);
        }

        let mut assignments: Vec<SocketAddr> = Vec::with_capacity(specs.len());
        for task in 0..specs.len() {
            let pick = if extra.contains(&task) {
                ledger.take_slot(&all_workers)
            } else {
                let local = candidates.get(&task).map(|c| c.as_slice()).unwrap_or(&[]);
                ledger.take_slot(local)
            };

            match pick {
                Some(worker) => assignments.push(worker),
                None => bail!("No candidate worker for task {}", task),
            }
        }
        drop(ledger);

        let mut handles = Vec::with_capacity(specs.len());
        for ((task, spec), worker) in specs.into_iter().enumerate().zip(assignments) {
            let task_needed: Vec<Key> = needed
                .get(&task)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            handles.push(self.dispatch(worker, spec, task_needed));
        }

        Ok(handles)
    }

    /// Sends one compute RPC on a background task and wires its outcome into
    /// the returned handle. The worker's slot is released on reply, success
    /// or not.
    fn dispatch(&self, worker: SocketAddr, spec: TaskSpec, needed: Vec<Key>) -> TaskHandle {
        let key = Key::new();
        let (tx, rx) = watch::channel(TaskState::Submitted);
        let handle = TaskHandle::new(key.clone(), self.center, rx);

        let op = WorkerOp::Compute {
            function: spec.function,
            key: key.clone(),
            args: spec.args,
            kwargs: spec.kwargs,
            needed,
        };

        let ledger = self.ledger.clone();
        tokio::spawn(async move {
            let _ = tx.send(TaskState::Dispatched { worker });
            tracing::debug!("Dispatched {} to {}", key, worker);

            let outcome = match send_recv::<_, WorkerReply>(worker, op).await {
                Ok(WorkerReply::Ok) => TaskState::Completed { worker },
                Ok(WorkerReply::Error { message }) => TaskState::Failed { error: message },
                Ok(other) => TaskState::Failed {
                    error: format!("Unexpected compute reply: {:?}", other),
                },
                Err(e) => TaskState::Failed {
                    error: format!("{:#}", e),
                },
            };

            ledger.lock().await.release_slot(worker);

            if let TaskState::Failed { error } = &outcome {
                tracing::warn!("Task {} on {} failed: {}", key, worker, error);
            }

            let _ = tx.send(outcome);
        });

        handle
    }
}
