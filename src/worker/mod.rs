//! Worker Module
//!
//! A worker owns data values and executes compute requests. It registers
//! with the center at startup, serves the data plane (`get-data`,
//! `update-data`, `del-data`), and runs `compute` requests end to end:
//! missing dependencies are pulled directly from the peers the center names,
//! never through the center itself.
//!
//! ## Compute Pipeline
//! 1. **Locate**: ask the center `who-has` for the needed keys.
//! 2. **Fetch**: pull each missing value from one randomly chosen holder via
//!    its `get-data`. Fetched values stay private to the running call.
//! 3. **Resolve**: substitute `Ref` arguments from the merged fetched+local
//!    view; literals pass through untouched.
//! 4. **Execute**: invoke the named function from the registry and store the
//!    result locally.
//! 5. **Advertise**: push `add-keys` to the center and wait for its ack
//!    before acking the original caller.
//!
//! ## Submodules
//! - **`store`**: the local key -> value store.
//! - **`registry`**: named compute functions the worker can run.
//! - **`protocol`**: wire DTOs for the worker service, including task
//!   arguments.
//! - **`service`**: registration, serving, and the compute pipeline.

pub mod protocol;
pub mod registry;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;
