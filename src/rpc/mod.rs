//! Framed RPC Layer
//!
//! This module implements the message plane every node speaks: single framed
//! JSON values over TCP, each request tagged with an operation name plus
//! per-request `reply` and `close` flags. The same machinery serves the
//! center directory, the workers, and the client pool.
//!
//! ## Core Mechanics
//! 1. **Framing**: every message is a 4-byte big-endian length prefix followed
//!    by a JSON payload. JSON keeps the operation envelope self-describing, so
//!    one connection can carry any mix of operations.
//! 2. **Envelope**: requests wrap their operation in an [`message::Envelope`]
//!    carrying the `reply`/`close` flags. Responses are bare values; whether
//!    one is sent at all is decided per request, not per operation.
//! 3. **Dispatch**: [`server::serve`] accepts connections until its
//!    cancellation token fires and hands each decoded operation to a
//!    type-erased async handler.
//!
//! ## Submodules
//! - **`message`**: envelope type and frame encoding/decoding.
//! - **`client`**: outbound connections and request/reply helpers.
//! - **`server`**: generic accept/dispatch loop.

pub mod client;
pub mod message;
pub mod server;
