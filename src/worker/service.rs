//! Worker Service
//!
//! Registration, serving, and the compute pipeline. The worker talks to the
//! center for metadata only; data values move directly between workers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::protocol::{TaskArg, WorkerOp, WorkerReply};
use super::registry::FunctionRegistry;
use super::store::DataStore;
use crate::center::protocol::{CenterOp, CenterReply, Key};
use crate::rpc::client::{Connection, send_recv};
use crate::rpc::server;

pub struct Worker {
    address: SocketAddr,
    center: SocketAddr,
    ncores: usize,
    pub store: DataStore,
    registry: Arc<FunctionRegistry>,
    listener: Mutex<Option<TcpListener>>,
    shutdown: CancellationToken,
}

impl Worker {
    /// Binds the worker listener. [`Worker::start`] registers with the
    /// center and begins serving.
    pub async fn new(
        bind_addr: SocketAddr,
        center: SocketAddr,
        ncores: usize,
        registry: Arc<FunctionRegistry>,
    ) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(bind_addr).await?;
        let address = listener.local_addr()?;

        Ok(Arc::new(Self {
            address,
            center,
            ncores,
            store: DataStore::new(),
            registry,
            listener: Mutex::new(Some(listener)),
            shutdown: CancellationToken::new(),
        }))
    }

    /// Address the worker is bound to.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Token that fires once the worker stops accepting connections.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Registers with the center, then starts serving in the background.
    /// Returns only after the center acknowledged the registration.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("Worker already started"))?;

        let reply: CenterReply = send_recv(
            self.center,
            CenterOp::Register {
                address: self.address,
                keys: vec![],
                ncores: self.ncores,
            },
        )
        .await
        .context("Failed to register with center")?;

        match reply {
            CenterReply::Ok => {
                info!(
                    "Worker {} registered with center {} ({} core(s))",
                    self.address, self.center, self.ncores
                );
            }
            other => bail!("Center rejected registration: {:?}", other),
        }

        let service = self.clone();
        let handler = server::handler_fn(move |op| {
            let service = service.clone();
            async move { service.handle(op).await }
        });

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(listener, handler, shutdown).await {
                tracing::error!("Worker listener failed: {:#}", e);
            }
        });

        Ok(())
    }

    async fn handle(&self, op: WorkerOp) -> WorkerReply {
        match op {
            WorkerOp::GetData { keys } => WorkerReply::Data {
                entries: self.store.get_many(&keys),
            },

            WorkerOp::UpdateData { data } => {
                tracing::debug!("Storing {} value(s) via update-data", data.len());
                self.store.extend(data);
                WorkerReply::Ok
            }

            WorkerOp::DelData { keys } => {
                for key in &keys {
                    self.store.remove(key);
                }
                tracing::debug!("Dropped {} key(s) via del-data", keys.len());
                WorkerReply::Ok
            }

            WorkerOp::Compute {
                function,
                key,
                args,
                kwargs,
                needed,
            } => match self.compute(&function, key.clone(), args, kwargs, needed).await {
                Ok(()) => WorkerReply::Ok,
                Err(e) => {
                    tracing::warn!("Compute of {} failed: {:#}", key, e);
                    WorkerReply::Error {
                        message: format!("{:#}", e),
                    }
                }
            },
        }
    }

    /// Runs one compute request end to end: fetch missing dependencies,
    /// resolve tagged arguments, invoke the function, store the result, and
    /// advertise the new key to the center before the caller is acked.
    async fn compute(
        &self,
        function: &str,
        key: Key,
        args: Vec<TaskArg>,
        kwargs: HashMap<String, TaskArg>,
        needed: Vec<Key>,
    ) -> Result<()> {
        let mut center = Connection::open(self.center)
            .await
            .context("Failed to reach center")?;

        let fetched = if needed.is_empty() {
            HashMap::new()
        } else {
            self.collect(&mut center, &needed).await?
        };

        let resolved_args: Vec<Value> = args
            .into_iter()
            .map(|arg| self.resolve(arg, &fetched))
            .collect::<Result<_>>()?;

        let resolved_kwargs: HashMap<String, Value> = kwargs
            .into_iter()
            .map(|(name, arg)| Ok((name, self.resolve(arg, &fetched)?)))
            .collect::<Result<_>>()?;

        let result = self.registry.call(function, &resolved_args, &resolved_kwargs)?;
        self.store.insert(key.clone(), result);

        let reply: CenterReply = center
            .request_closing(CenterOp::AddKeys {
                address: self.address,
                keys: vec![key.clone()],
            })
            .await
            .context("Failed to advertise result key")?;

        match reply {
            CenterReply::Ok => {}
            other => bail!("Center rejected add-keys: {:?}", other),
        }

        tracing::debug!("Computed {} via {}", key, function);
        Ok(())
    }

    /// Pulls every needed key that is not already local from one of its
    /// holders, as reported by the center. Fetched values stay private to
    /// the running call; only the computed result gets stored and
    /// advertised.
    async fn collect(
        &self,
        center: &mut Connection,
        needed: &[Key],
    ) -> Result<HashMap<Key, Value>> {
        let reply: CenterReply = center
            .request(CenterOp::WhoHas {
                keys: Some(needed.to_vec()),
            })
            .await
            .context("who-has query failed")?;

        let holders = match reply {
            CenterReply::WhoHas { holders } => holders,
            other => bail!("Unexpected who-has reply: {:?}", other),
        };

        let mut fetched = HashMap::new();
        for key in needed {
            if self.store.contains(key) {
                continue;
            }

            let candidates: Vec<SocketAddr> = holders
                .get(key)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();

            if candidates.is_empty() {
                bail!("No holder known for key {}", key);
            }

            use rand::Rng;
            let holder = candidates[rand::thread_rng().gen_range(0..candidates.len())];

            let reply: WorkerReply = send_recv(holder, WorkerOp::GetData { keys: vec![key.clone()] })
                .await
                .with_context(|| format!("Failed to fetch {} from holder {}", key, holder))?;

            match reply {
                WorkerReply::Data { mut entries } => match entries.remove(key) {
                    Some(value) => {
                        tracing::debug!("Fetched {} from {}", key, holder);
                        fetched.insert(key.clone(), value);
                    }
                    None => bail!("Holder {} no longer has key {}", holder, key),
                },
                other => bail!("Unexpected get-data reply from {}: {:?}", holder, other),
            }
        }

        Ok(fetched)
    }

    fn resolve(&self, arg: TaskArg, fetched: &HashMap<Key, Value>) -> Result<Value> {
        match arg {
            TaskArg::Literal { value } => Ok(value),
            TaskArg::Ref { key } => fetched
                .get(&key)
                .cloned()
                .or_else(|| self.store.get(&key))
                .ok_or_else(|| anyhow!("Unresolved data reference: {}", key)),
        }
    }
}
