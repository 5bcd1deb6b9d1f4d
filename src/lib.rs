//! Distributed Task Scheduling Library
//!
//! This library crate defines the core modules that make up the scheduling
//! system. It serves as the foundation for the node binary (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of four loosely coupled subsystems:
//!
//! - **`rpc`**: The wire layer. Length-prefixed JSON frames, a request
//!   envelope carrying per-message reply/close flags, and a generic
//!   connection-per-task server loop.
//! - **`center`**: The metadata authority. Tracks which worker holds which
//!   key (and the inverse), plus per-worker core counts, and orchestrates
//!   cluster-wide deletions.
//! - **`worker`**: The execution and storage layer. Each worker owns a local
//!   key -> value store, serves data-plane requests, and runs named compute
//!   functions, fetching missing inputs from peer workers.
//! - **`pool`**: The client-side scheduler. Places tasks near their inputs,
//!   tracks per-worker free cores, and hands out two-stage result handles.

pub mod center;
pub mod pool;
pub mod rpc;
pub mod worker;
