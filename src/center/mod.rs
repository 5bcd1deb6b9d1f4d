//! Metadata Center Module
//!
//! The center is the authoritative, non-durable directory of the cluster: it
//! knows which worker holds which data key and how many cores each worker
//! registered. It never touches data values; workers exchange those among
//! themselves.
//!
//! ## Core Mechanics
//! 1. **Inverse indexes**: `who_has` (key -> holders) and `has_what`
//!    (holder -> keys) are kept exact mirrors of each other by every mutating
//!    operation, together with `ncores` (holder -> core count).
//! 2. **Atomic handlers**: all three maps live in one [`directory::Directory`]
//!    behind a single lock, so each request observes and leaves a consistent
//!    directory. The lock is never held across network I/O.
//! 3. **Delete orchestration**: `delete-data` first rewrites the directory,
//!    then fans `del-data` out to every former holder concurrently and acks
//!    once every attempt finished.
//!
//! ## Submodules
//! - **`directory`**: the metadata maps and their operations.
//! - **`protocol`**: wire DTOs for the directory service.
//! - **`service`**: the TCP service dispatching requests to the directory.

pub mod directory;
pub mod protocol;
pub mod service;
