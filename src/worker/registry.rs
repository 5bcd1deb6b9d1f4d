//! Compute Function Registry
//!
//! A dynamic registry that maps string-based function names (e.g., "add")
//! to executable Rust closures. This keeps the worker generic: the system
//! never interprets function bodies, it only names them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use dashmap::DashMap;
use serde_json::Value;

/// Type alias for a registered compute function.
///
/// Functions are synchronous on purpose: a compute body must not suspend
/// between reading its inputs and producing its output, so every suspension
/// point of a compute request stays in the surrounding network code.
pub type ComputeFn = Arc<dyn Fn(&[Value], &HashMap<String, Value>) -> Result<Value> + Send + Sync>;

/// Registry holding the mapping between function names and implementations.
pub struct FunctionRegistry {
    functions: DashMap<String, ComputeFn>,
}

impl FunctionRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            functions: DashMap::new(),
        })
    }

    /// Registers a function under a name, replacing any previous entry.
    pub fn register<F>(&self, name: &str, function: F)
    where
        F: Fn(&[Value], &HashMap<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));

        tracing::info!("Registered compute function: {}", name);
    }

    /// Looks up a function by name and invokes it with resolved arguments.
    pub fn call(&self, name: &str, args: &[Value], kwargs: &HashMap<String, Value>) -> Result<Value> {
        match self.functions.get(name) {
            Some(function) => function.value()(args, kwargs),
            None => Err(anyhow!("Unknown compute function: {}", name)),
        }
    }

    /// Checks if a function is registered.
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Returns the total number of registered functions.
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}
