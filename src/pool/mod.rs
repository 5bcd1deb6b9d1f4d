//! Pool Module
//!
//! The client-side scheduler. A pool talks to the center for metadata,
//! places each task where its inputs already live, dispatches compute
//! requests, and hands out two-stage result handles.
//!
//! ## Scheduling Overview
//! 1. **Sync**: the pool seeds its per-worker free-slot ledger from the
//!    center's `ncores` map.
//! 2. **Placement**: [`placement::divide_tasks`] splits a batch into tasks
//!    with at least one fully-local worker (`shares`) and the rest
//!    (`extra`). Locality and load stay separate passes: shares pick the
//!    least-loaded candidate, extras the least-loaded worker overall.
//! 3. **Dispatch**: each task's compute RPC runs on its own background task;
//!    the reply releases the worker's slot and resolves stage one of the
//!    handle.
//! 4. **Results**: stage two fetches the value from the worker that computed
//!    it.
//!
//! ## Submodules
//! - **`placement`**: the pure locality split.
//! - **`task`**: task specs, the per-task state machine, result handles.
//! - **`pool`**: the scheduler itself.

pub mod placement;
pub mod pool;
pub mod task;
