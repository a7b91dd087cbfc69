//! Ownership of named script runtimes.

use crate::capability::{Capability, CapabilityRegistry};
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::runtime::ScriptRuntime;
use ate_event::EventRegistry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

/// Creates, looks up and removes [`ScriptRuntime`]s by name.
///
/// Capabilities registered on the manager are bound into every runtime it
/// creates afterwards.
///
/// ```
/// use ate_event::LocalEventBus;
/// use ate_lua::{Capability, RuntimeConfig, RuntimeManager};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let manager = RuntimeManager::new(Arc::new(LocalEventBus::new()), RuntimeConfig::default());
/// manager.register_capability("chainName", Capability::value("testnet"));
///
/// let rt = manager.create_runtime("wallet").expect("create");
/// rt.add_script("function net() return chainName end").expect("script");
/// assert_eq!(rt.call_function("net", vec![]).expect("call"), json!("testnet"));
/// ```
pub struct RuntimeManager {
    runtimes: RwLock<HashMap<String, Arc<ScriptRuntime>>>,
    capabilities: CapabilityRegistry,
    bus: Arc<dyn EventRegistry>,
    config: RuntimeConfig,
    handle: Option<Handle>,
}

impl RuntimeManager {
    /// Creates a manager publishing subscriptions on `bus`.
    ///
    /// If called inside a tokio runtime, its handle hosts the forwarding
    /// tasks of subscriptions made from non-async threads.
    pub fn new(bus: Arc<dyn EventRegistry>, config: RuntimeConfig) -> Self {
        Self {
            runtimes: RwLock::new(HashMap::new()),
            capabilities: CapabilityRegistry::new(),
            bus,
            config,
            handle: Handle::try_current().ok(),
        }
    }

    /// Uses `handle` for forwarding tasks.
    #[must_use]
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Creates the runtime `name`, replacing (and shutting down) any
    /// runtime previously registered under it.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InitFailed`] if the VM cannot be set up.
    pub fn create_runtime(&self, name: &str) -> Result<Arc<ScriptRuntime>, RuntimeError> {
        let snapshot = self.capabilities.snapshot();
        let runtime = ScriptRuntime::new(
            name,
            Arc::clone(&self.bus),
            self.config.clone(),
            self.handle.clone(),
            &snapshot,
        )?;

        let previous = self
            .runtimes
            .write()
            .insert(name.to_string(), Arc::clone(&runtime));
        if let Some(previous) = previous {
            info!(runtime = %name, "replacing existing runtime");
            previous.shutdown();
        }
        info!(runtime = %name, capabilities = snapshot.len(), "runtime created");
        Ok(runtime)
    }

    /// Looks up a runtime.
    #[must_use]
    pub fn get_runtime(&self, name: &str) -> Option<Arc<ScriptRuntime>> {
        self.runtimes.read().get(name).cloned()
    }

    /// Looks up a runtime that must exist.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotFound`] if there is none.
    pub fn require_runtime(&self, name: &str) -> Result<Arc<ScriptRuntime>, RuntimeError> {
        self.get_runtime(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
    }

    /// Removes and shuts down a runtime, returning it.
    pub fn remove_runtime(&self, name: &str) -> Option<Arc<ScriptRuntime>> {
        let removed = self.runtimes.write().remove(name);
        if let Some(ref runtime) = removed {
            runtime.shutdown();
            info!(runtime = %name, "runtime removed");
        }
        removed
    }

    /// Registers a capability for runtimes created from now on.
    pub fn register_capability(&self, name: impl Into<String>, capability: Capability) {
        self.capabilities.register(name, capability);
    }

    /// The capability registry.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Names of registered runtimes, sorted.
    #[must_use]
    pub fn runtime_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.runtimes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered runtimes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runtimes.read().len()
    }

    /// Whether no runtimes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runtimes.read().is_empty()
    }

    /// Removes and shuts down every runtime.
    pub fn shutdown_all(&self) {
        let drained: Vec<_> = self.runtimes.write().drain().collect();
        let count = drained.len();
        for (_, runtime) in drained {
            runtime.shutdown();
        }
        info!(count, "all runtimes shut down");
    }
}

impl std::fmt::Debug for RuntimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeManager")
            .field("runtimes", &self.runtime_names())
            .field("capabilities", &self.capabilities.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
