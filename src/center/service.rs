//! Center Service
//!
//! TCP front of the directory: dispatches decoded operations to the
//! [`Directory`], orchestrates delete fan-out across workers, and stops
//! accepting connections on terminate.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures::future::join_all;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::directory::Directory;
use super::protocol::{CenterOp, CenterReply, Key};
use crate::rpc::client::send_recv;
use crate::rpc::server;
use crate::worker::protocol::{WorkerOp, WorkerReply};

pub struct Center {
    address: SocketAddr,
    directory: RwLock<Directory>,
    listener: Mutex<Option<TcpListener>>,
    shutdown: CancellationToken,
}

impl Center {
    /// Binds the directory service. Call [`Center::start`] to begin serving.
    pub async fn new(bind_addr: SocketAddr) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(bind_addr).await?;
        let address = listener.local_addr()?;

        Ok(Arc::new(Self {
            address,
            directory: RwLock::new(Directory::new()),
            listener: Mutex::new(Some(listener)),
            shutdown: CancellationToken::new(),
        }))
    }

    /// Address the service is bound to.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Token that fires once the service stops accepting connections.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Directory summary: tracked keys and registered workers.
    pub async fn stats(&self) -> (usize, usize) {
        let directory = self.directory.read().await;
        (directory.tracked_keys(), directory.worker_count())
    }

    /// Starts the accept loop in the background.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("Center already started"))?;

        info!("Center serving directory on {}", self.address);

        let service = self.clone();
        let handler = server::handler_fn(move |op| {
            let service = service.clone();
            async move { service.handle(op).await }
        });

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(listener, handler, shutdown).await {
                tracing::error!("Center listener failed: {:#}", e);
            }
        });

        Ok(())
    }

    async fn handle(&self, op: CenterOp) -> CenterReply {
        match op {
            CenterOp::Register {
                address,
                keys,
                ncores,
            } => {
                self.directory.write().await.register(address, keys, ncores);
                info!("Registered worker {} with {} core(s)", address, ncores);
                CenterReply::Ok
            }

            CenterOp::Unregister { address } => {
                if self.directory.write().await.unregister(&address) {
                    info!("Unregistered worker {}", address);
                    CenterReply::Ok
                } else {
                    CenterReply::Error {
                        message: format!("Address not found: {}", address),
                    }
                }
            }

            CenterOp::AddKeys { address, keys } => {
                tracing::debug!("Worker {} advertises {} key(s)", address, keys.len());
                self.directory.write().await.add_keys(address, keys);
                CenterReply::Ok
            }

            CenterOp::RemoveKeys { address, keys } => {
                self.directory.write().await.remove_keys(&address, &keys);
                CenterReply::Ok
            }

            CenterOp::WhoHas { keys } => {
                let directory = self.directory.read().await;
                CenterReply::WhoHas {
                    holders: directory.who_has(keys.as_deref()),
                }
            }

            CenterOp::HasWhat { addresses } => {
                let directory = self.directory.read().await;
                CenterReply::HasWhat {
                    held: directory.has_what(addresses.as_deref()),
                }
            }

            CenterOp::Ncores { addresses } => {
                let directory = self.directory.read().await;
                CenterReply::Ncores {
                    cores: directory.ncores(addresses.as_deref()),
                }
            }

            CenterOp::DeleteData { keys } => self.delete_data(keys).await,

            CenterOp::Terminate => {
                info!("Terminate requested, draining in-flight connections");
                self.shutdown.cancel();
                CenterReply::Ok
            }
        }
    }

    /// Removes keys from the directory, then tells every former holder to
    /// drop its local copies. The ack waits for every worker RPC to be
    /// attempted; individual failures are logged and swallowed.
    async fn delete_data(&self, keys: Vec<Key>) -> CenterReply {
        let dropped = self.directory.write().await.delete_keys(&keys);

        let deletions = dropped.into_iter().map(|(worker, keys)| async move {
            let count = keys.len();
            match send_recv::<_, WorkerReply>(worker, WorkerOp::DelData { keys }).await {
                Ok(WorkerReply::Ok) => {
                    tracing::debug!("Worker {} dropped {} key(s)", worker, count);
                }
                Ok(other) => {
                    tracing::warn!("Unexpected del-data reply from {}: {:?}", worker, other);
                }
                Err(e) => {
                    tracing::warn!("Failed to reach {} for del-data: {:#}", worker, e);
                }
            }
        });

        join_all(deletions).await;

        CenterReply::Ok
    }
}
