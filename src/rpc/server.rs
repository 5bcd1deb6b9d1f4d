//! RPC Server Loop
//!
//! Generic accept/dispatch loop shared by the center and the workers. Each
//! accepted connection is handled on its own task: requests are read in
//! order, dispatched to the service handler, and answered or not according
//! to the envelope flags.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::message::{Envelope, read_message, write_message};

/// Type alias for a thread-safe, asynchronous operation handler.
/// It takes a decoded operation and returns a Future resolving to the reply
/// value; whether that value is actually sent depends on the request flags.
pub type OpHandler<Op, Reply> =
    Arc<dyn Fn(Op) -> Pin<Box<dyn Future<Output = Reply> + Send>> + Send + Sync>;

/// Wraps a plain async closure into the type-erased handler form stored and
/// cloned by the serve loop.
pub fn handler_fn<Op, Reply, F, Fut>(f: F) -> OpHandler<Op, Reply>
where
    F: Fn(Op) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    Arc::new(move |op| Box::pin(f(op)) as Pin<Box<dyn Future<Output = Reply> + Send>>)
}

/// Accepts connections until `shutdown` fires, spawning one task per
/// connection. Already-accepted connections are left to finish their
/// in-flight requests on their own tasks.
pub async fn serve<Op, Reply>(
    listener: TcpListener,
    handler: OpHandler<Op, Reply>,
    shutdown: CancellationToken,
) -> Result<()>
where
    Op: DeserializeOwned + Send + 'static,
    Reply: Serialize + Send + Sync + 'static,
{
    let local = listener.local_addr()?;
    tracing::info!("Serving on {}", local);

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Listener on {} stopped accepting connections", local);
                return Ok(());
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                tracing::debug!("Accepted connection from {}", peer);

                let handler = handler.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, handler).await;
                });
            }
            Err(e) => {
                tracing::warn!("Failed to accept connection on {}: {}", local, e);
            }
        }
    }
}

async fn handle_connection<Op, Reply>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: OpHandler<Op, Reply>,
) where
    Op: DeserializeOwned + Send + 'static,
    Reply: Serialize + Send + Sync + 'static,
{
    loop {
        let envelope: Envelope<Op> = match read_message(&mut stream).await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!("Connection from {} ended: {:#}", peer, e);
                return;
            }
        };

        let wants_reply = envelope.reply;
        let wants_close = envelope.close;

        let reply = handler(envelope.op).await;

        if wants_reply {
            if let Err(e) = write_message(&mut stream, &reply).await {
                tracing::warn!("Failed to reply to {}: {:#}", peer, e);
                return;
            }
        }

        if wants_close {
            tracing::debug!("Closing connection from {} on request", peer);
            return;
        }
    }
}
