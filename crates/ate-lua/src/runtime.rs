//! Named scripting environments.
//!
//! A [`ScriptRuntime`] owns one Lua VM behind an execution guard. Every
//! public operation acquires the guard for its whole duration, so at most
//! one script operation runs per runtime at any time, whichever thread
//! (or forwarding task) calls it.
//!
//! # Bound globals
//!
//! | Global | Source |
//! |--------|--------|
//! | `RuntimeId` | the runtime name |
//! | `smath`, `sutil`, `scrypto` | [`bindings`](crate::bindings) |
//! | `Print`, `Println`, `Printf`, `TimeMS`, `json` | [`bindings`](crate::bindings) |
//! | `events`, `network`, `E_*` | [`prelude`](crate::prelude) |
//! | registered capabilities | [`CapabilityRegistry`](crate::CapabilityRegistry) |

use crate::bindings;
use crate::bridge::{self, EventBridge};
use crate::capability::Capability;
use crate::config::RuntimeConfig;
use crate::convert::{json_to_lua, lua_to_json};
use crate::error::RuntimeError;
use crate::guard::ExecutionGuard;
use crate::prelude;
use ate_event::EventRegistry;
use mlua::{Function, HookTriggers, Lua, MultiValue, Value, VmState};
use serde_json::Value as JsonValue;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Instructions between deadline checks when a call timeout is set.
const DEADLINE_CHECK_INTERVAL: u32 = 1_000;

/// One named scripting environment.
pub struct ScriptRuntime {
    name: String,
    vm: ExecutionGuard<Lua>,
    bridge: Arc<EventBridge>,
    active: AtomicBool,
    config: RuntimeConfig,
}

impl ScriptRuntime {
    /// Creates a runtime with defaults, preludes and the given capabilities.
    ///
    /// `handle` hosts forwarding tasks for subscriptions made from threads
    /// without a tokio context.
    pub(crate) fn new(
        name: impl Into<String>,
        bus: Arc<dyn EventRegistry>,
        config: RuntimeConfig,
        handle: Option<Handle>,
        capabilities: &[(String, Capability)],
    ) -> Result<Arc<Self>, RuntimeError> {
        let name = name.into();
        let bridge = Arc::new(EventBridge::new(name.clone(), bus, handle));
        let lua = Lua::new();
        install(&lua, &name, &bridge, capabilities).map_err(|e| RuntimeError::InitFailed {
            runtime: name.clone(),
            message: e.to_string(),
        })?;

        let runtime = Arc::new(Self {
            vm: ExecutionGuard::new(name.clone(), lua),
            name,
            bridge: Arc::clone(&bridge),
            active: AtomicBool::new(true),
            config,
        });
        bridge.attach(Arc::downgrade(&runtime));
        debug!(runtime = %runtime.name, capabilities = capabilities.len(), "runtime created");
        Ok(runtime)
    }

    /// The runtime's name, also bound as `RuntimeId`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// False once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ids of the event subscriptions created by this runtime's scripts.
    #[must_use]
    pub fn subscription_ids(&self) -> Vec<String> {
        self.bridge.subscription_ids()
    }

    /// The runtime's event bridge.
    #[must_use]
    pub fn bridge(&self) -> &Arc<EventBridge> {
        &self.bridge
    }

    /// Current execution guard hold count (0 or 1).
    #[must_use]
    pub fn guard_holds(&self) -> usize {
        self.vm.holds()
    }

    /// Reads and evaluates one script file.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Io`] if the file cannot be read,
    /// [`RuntimeError::Evaluation`] if it fails to compile or run.
    pub fn load_script_file(&self, path: impl AsRef<Path>) -> Result<(), RuntimeError> {
        self.load_script_files(&[path])
    }

    /// Reads and evaluates script files in order under one guard hold.
    ///
    /// Stops at the first failure. Files evaluated before it stay in effect.
    ///
    /// # Errors
    ///
    /// The first [`RuntimeError::Io`] or [`RuntimeError::Evaluation`].
    #[tracing::instrument(skip_all, fields(runtime = %self.name, count = paths.len()))]
    pub fn load_script_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<(), RuntimeError> {
        self.with_vm("load_script_files", |lua| {
            for path in paths {
                let path = path.as_ref();
                let source = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                self.exec_chunk(lua, &source, &format!("@{}", path.display()))?;
                debug!(path = %path.display(), "script loaded");
            }
            Ok(())
        })
    }

    /// Binds `capability` as the global `name`. Last write wins.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Conversion`] if the value cannot be created in the VM.
    pub fn bind_script_object(
        &self,
        name: &str,
        capability: &Capability,
    ) -> Result<(), RuntimeError> {
        self.with_vm("bind_script_object", |lua| {
            capability
                .to_lua(lua)
                .and_then(|value| lua.globals().set(name, value))
                .map_err(|e| RuntimeError::Conversion {
                    function: name.to_string(),
                    message: e.to_string(),
                })
        })
    }

    /// Evaluates inline source.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Evaluation`] if the source fails to compile or run.
    #[tracing::instrument(skip_all, fields(runtime = %self.name))]
    pub fn add_script(&self, source: &str) -> Result<(), RuntimeError> {
        self.with_vm("add_script", |lua| self.exec_chunk(lua, source, "=add_script"))
    }

    /// Evaluates `return name(a1, a2, ...)` built from raw Lua expressions.
    ///
    /// The arguments are spliced into source text as given: callers must
    /// serialize them as valid Lua and must not pass untrusted input.
    /// Prefer [`call_function`](Self::call_function).
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Call`] naming the function and the cause.
    #[tracing::instrument(skip(self, raw_args), fields(runtime = %self.name))]
    pub fn run_function(&self, name: &str, raw_args: &[&str]) -> Result<JsonValue, RuntimeError> {
        let chunk = format!("return {name}({})", raw_args.join(", "));
        self.with_vm("run_function", |lua| {
            let value = lua
                .load(chunk.as_str())
                .set_name("=run_function")
                .eval::<Value>()
                .map_err(|e| call_failed(name, &e))?;
            export(lua, name, value)
        })
    }

    /// Calls the global function `name` with JSON arguments.
    ///
    /// Returns the first result, converted to JSON (`nil` becomes `null`).
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Call`] if `name` is not a function or raises;
    /// [`RuntimeError::Conversion`] if arguments or result cannot cross.
    #[tracing::instrument(skip(self, args), fields(runtime = %self.name))]
    pub fn call_function(&self, name: &str, args: Vec<JsonValue>) -> Result<JsonValue, RuntimeError> {
        self.with_vm("call_function", |lua| {
            let function = match lua.globals().get::<Value>(name) {
                Ok(Value::Function(f)) => f,
                Ok(other) => {
                    return Err(RuntimeError::Call {
                        function: name.to_string(),
                        message: format!("not a function (found {})", other.type_name()),
                    })
                }
                Err(e) => return Err(call_failed(name, &e)),
            };
            let args = to_args(lua, &args).map_err(|e| RuntimeError::Conversion {
                function: name.to_string(),
                message: e.to_string(),
            })?;
            let value = function
                .call::<Value>(args)
                .map_err(|e| call_failed(name, &e))?;
            export(lua, name, value)
        })
    }

    /// Calls `object.method(args...)` on a global table, containing faults.
    ///
    /// Script errors and panics raised by host callbacks during the call are
    /// caught and returned as [`RuntimeError::GuestFailure`]; the runtime
    /// stays usable. This is the entry point used for event delivery.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::GuestFailure`] for any failure inside the call.
    #[tracing::instrument(skip(self, args), fields(runtime = %self.name), level = "debug")]
    pub fn call_method_on_object(
        &self,
        object: &str,
        method: &str,
        args: Vec<JsonValue>,
    ) -> Result<JsonValue, RuntimeError> {
        self.with_vm("call_method_on_object", |lua| {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| invoke_method(lua, object, method, &args)));
            let failure = |message: String| RuntimeError::GuestFailure {
                object: object.to_string(),
                method: method.to_string(),
                message,
            };
            match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    warn!(object, method, error = %e, "guest call failed");
                    Err(failure(e.to_string()))
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(object, method, panic = %message, "guest call panicked");
                    Err(failure(format!("panic: {message}")))
                }
            }
        })
    }

    /// Marks the runtime inactive.
    ///
    /// With `cancel_subscriptions_on_shutdown` set, every subscription made
    /// by its scripts is cancelled. Idempotent; does not wait for a running
    /// operation to finish.
    pub fn shutdown(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let cancelled = if self.config.cancel_subscriptions_on_shutdown {
            self.bridge.cancel_all()
        } else {
            0
        };
        info!(runtime = %self.name, cancelled, "runtime shut down");
    }

    fn exec_chunk(&self, lua: &Lua, source: &str, chunk: &str) -> Result<(), RuntimeError> {
        lua.load(source)
            .set_name(chunk)
            .exec()
            .map_err(|e| RuntimeError::Evaluation {
                runtime: self.name.clone(),
                chunk: chunk.to_string(),
                message: e.to_string(),
            })
    }

    /// Runs `f` with exclusive access to the VM.
    fn with_vm<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Lua) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError> {
        if !self.is_active() {
            return Err(RuntimeError::Inactive(self.name.clone()));
        }
        let vm = self.vm.acquire();

        let Some(timeout_ms) = self.config.call_timeout_ms else {
            return f(&*vm);
        };

        let expired = Arc::new(AtomicBool::new(false));
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let flag = Arc::clone(&expired);
        vm.set_hook(
            HookTriggers::new().every_nth_instruction(DEADLINE_CHECK_INTERVAL),
            move |_lua, _debug| {
                if Instant::now() < deadline {
                    return Ok(VmState::Continue);
                }
                flag.store(true, Ordering::Release);
                Err(mlua::Error::RuntimeError(format!(
                    "execution deadline of {timeout_ms}ms exceeded"
                )))
            },
        );
        let result = f(&*vm);
        vm.remove_hook();

        if expired.load(Ordering::Acquire) {
            warn!(runtime = %self.name, operation, timeout_ms, "operation timed out");
            return Err(RuntimeError::Timeout {
                runtime: self.name.clone(),
                operation,
                timeout_ms,
            });
        }
        result
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        self.bridge.cancel_all();
    }
}

impl std::fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .field("subscriptions", &self.bridge.subscription_ids())
            .finish_non_exhaustive()
    }
}

/// Binds the fixed globals in creation order. Later bindings win.
fn install(
    lua: &Lua,
    name: &str,
    bridge: &Arc<EventBridge>,
    capabilities: &[(String, Capability)],
) -> mlua::Result<()> {
    lua.globals().set("RuntimeId", name)?;
    bindings::register(lua)?;
    bridge::register(lua, bridge)?;
    prelude::load(lua)?;
    for (cap_name, capability) in capabilities {
        lua.globals().set(cap_name.as_str(), capability.to_lua(lua)?)?;
    }
    Ok(())
}

fn invoke_method(
    lua: &Lua,
    object: &str,
    method: &str,
    args: &[JsonValue],
) -> mlua::Result<JsonValue> {
    let table = match lua.globals().get::<Value>(object)? {
        Value::Table(t) => t,
        other => {
            return Err(mlua::Error::RuntimeError(format!(
                "'{object}' is not an object (found {})",
                other.type_name()
            )))
        }
    };
    let function: Function = match table.get::<Value>(method)? {
        Value::Function(f) => f,
        other => {
            return Err(mlua::Error::RuntimeError(format!(
                "'{object}.{method}' is not a function (found {})",
                other.type_name()
            )))
        }
    };
    let value = function.call::<Value>(to_args(lua, args)?)?;
    lua_to_json(lua, value)
}

fn to_args(lua: &Lua, args: &[JsonValue]) -> mlua::Result<MultiValue> {
    args.iter().map(|a| json_to_lua(lua, a)).collect()
}

fn export(lua: &Lua, function: &str, value: Value) -> Result<JsonValue, RuntimeError> {
    lua_to_json(lua, value).map_err(|e| RuntimeError::Conversion {
        function: function.to_string(),
        message: e.to_string(),
    })
}

fn call_failed(function: &str, err: &mlua::Error) -> RuntimeError {
    RuntimeError::Call {
        function: function.to_string(),
        message: err.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
