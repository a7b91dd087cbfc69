//! Test harness for script runtimes.
//!
//! Bundles a [`LocalEventBus`] with a [`RuntimeManager`] so tests can load
//! scripts, publish events and observe what the scripts did.
//!
//! # Example
//!
//! ```
//! use ate_lua::testing::{Recorder, RuntimeHarness};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let harness = RuntimeHarness::new();
//! let recorder = Recorder::new();
//! harness.manager().register_capability("record", recorder.capability());
//!
//! harness
//!     .runtime_with_script("app", r#"
//!         events.subscribe("chain", "newBlock", nil, function(e) record(e.payload.height) end, 1)
//!     "#)
//!     .expect("runtime");
//!
//! harness.publish("chain", "newBlock", json!({"height": 10}));
//! assert!(harness.wait_until(Duration::from_secs(5), || recorder.len() == 1).await);
//! assert_eq!(recorder.entries(), vec![json!(10)]);
//! # });
//! ```

use crate::capability::Capability;
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::manager::RuntimeManager;
use crate::runtime::ScriptRuntime;
use ate_event::{Event, EventRegistry, LocalEventBus};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A bus plus a manager wired to it.
pub struct RuntimeHarness {
    bus: Arc<LocalEventBus>,
    manager: RuntimeManager,
}

impl RuntimeHarness {
    /// Creates a harness with the default runtime configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a harness whose runtimes use `config`.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        let bus = Arc::new(LocalEventBus::new());
        let manager = RuntimeManager::new(Arc::clone(&bus) as Arc<dyn EventRegistry>, config);
        Self { bus, manager }
    }

    /// The underlying bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<LocalEventBus> {
        &self.bus
    }

    /// The underlying manager.
    #[must_use]
    pub fn manager(&self) -> &RuntimeManager {
        &self.manager
    }

    /// Creates a runtime and evaluates `script` in it.
    ///
    /// # Errors
    ///
    /// Any creation or evaluation error.
    pub fn runtime_with_script(
        &self,
        name: &str,
        script: &str,
    ) -> Result<Arc<ScriptRuntime>, RuntimeError> {
        let runtime = self.manager.create_runtime(name)?;
        runtime.add_script(script)?;
        Ok(runtime)
    }

    /// Publishes an event without a target.
    pub fn publish(&self, source: &str, event_type: &str, payload: JsonValue) -> usize {
        self.bus.publish(&Event::new(source, event_type, payload))
    }

    /// Publishes an event addressed to `target`.
    pub fn publish_to(
        &self,
        source: &str,
        event_type: &str,
        target: &str,
        payload: JsonValue,
    ) -> usize {
        self.bus
            .publish(&Event::new(source, event_type, payload).with_target(target))
    }

    /// Polls `condition` until it holds or `timeout` elapses.
    ///
    /// Returns the final value of the condition.
    pub async fn wait_until(&self, timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }
}

impl Default for RuntimeHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Host function capability that records the first argument of each call.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<JsonValue>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A function capability appending its first argument (or `null`).
    #[must_use]
    pub fn capability(&self) -> Capability {
        let entries = Arc::clone(&self.entries);
        Capability::function(move |args| {
            entries
                .lock()
                .push(args.into_iter().next().unwrap_or(JsonValue::Null));
            Ok(JsonValue::Null)
        })
    }

    /// Snapshot of recorded values.
    #[must_use]
    pub fn entries(&self) -> Vec<JsonValue> {
        self.entries.lock().clone()
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
