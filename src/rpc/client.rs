//! RPC Client Helpers
//!
//! Outbound side of the message plane: open a connection, send enveloped
//! requests, read replies. Long-lived exchanges use [`Connection`]; one-shot
//! exchanges use [`send_recv`].

use std::net::SocketAddr;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;

use super::message::{Envelope, read_message, write_message};

/// Opens a TCP connection to a peer.
pub async fn connect(addr: SocketAddr) -> Result<TcpStream> {
    TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))
}

/// A client connection that can carry several requests in sequence.
pub struct Connection {
    peer: SocketAddr,
    stream: TcpStream,
}

impl Connection {
    pub async fn open(addr: SocketAddr) -> Result<Self> {
        let stream = connect(addr).await?;
        Ok(Self { peer: addr, stream })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sends a request and waits for its reply, keeping the connection open
    /// for further requests.
    pub async fn request<Op, Reply>(&mut self, op: Op) -> Result<Reply>
    where
        Op: Serialize,
        Reply: DeserializeOwned,
    {
        write_message(&mut self.stream, &Envelope::request(op)).await?;
        read_message(&mut self.stream)
            .await
            .with_context(|| format!("No reply from {}", self.peer))
    }

    /// Sends a request and waits for its reply, asking the peer to close the
    /// connection afterwards.
    pub async fn request_closing<Op, Reply>(&mut self, op: Op) -> Result<Reply>
    where
        Op: Serialize,
        Reply: DeserializeOwned,
    {
        write_message(&mut self.stream, &Envelope::request_closing(op)).await?;
        read_message(&mut self.stream)
            .await
            .with_context(|| format!("No reply from {}", self.peer))
    }

    /// Fire-and-forget: no reply is requested and none is read.
    pub async fn send<Op>(&mut self, op: Op) -> Result<()>
    where
        Op: Serialize,
    {
        write_message(&mut self.stream, &Envelope::send_only(op)).await
    }
}

/// One-shot exchange: open a connection, send a single request with
/// `reply` + `close` set, and return the reply.
pub async fn send_recv<Op, Reply>(addr: SocketAddr, op: Op) -> Result<Reply>
where
    Op: Serialize,
    Reply: DeserializeOwned,
{
    let mut conn = Connection::open(addr).await?;
    conn.request_closing(op).await
}
