//! Lua script runtimes for ate applications.
//!
//! Each application gets a named [`ScriptRuntime`]: a Lua 5.4 VM with the
//! numeric, crypto and string helpers, the `events` and `network` preludes
//! and any host [`Capability`] registered on the [`RuntimeManager`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────── RuntimeManager ─────────────────────┐
//! │  CapabilityRegistry ──snapshot at creation──┐            │
//! │                                             ▼            │
//! │  "wallet" ─► ScriptRuntime { ExecutionGuard<Lua>, bridge }│
//! │  "dex"    ─► ScriptRuntime { ... }                        │
//! └──────────────────────────────┬───────────────────────────┘
//!                                │ events.subscribe(...)
//!                                ▼
//!              EventBridge ──► one forwarding task per subscription
//!                   ▲                      │ spawn_blocking
//!        EventRegistry (bus)               ▼
//!                               call_method_on_object("events", "post", ..)
//! ```
//!
//! # Concurrency
//!
//! All operations on one runtime are serialized by its execution guard.
//! Different runtimes run in parallel. Re-entering a runtime from the
//! thread that is already running one of its operations (for example from
//! a host function) is a fatal error and aborts the process.
//!
//! # Example
//!
//! ```
//! use ate_event::LocalEventBus;
//! use ate_lua::{RuntimeConfig, RuntimeManager};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let manager = RuntimeManager::new(Arc::new(LocalEventBus::new()), RuntimeConfig::default());
//! let rt = manager.create_runtime("calc").expect("create");
//! rt.add_script(r#"function total(a, b) return smath.add(a, b) end"#).expect("script");
//! assert_eq!(rt.call_function("total", vec![json!("0xff"), json!("1")]).expect("call"), json!("0x100"));
//! ```

pub mod bindings;
mod bridge;
mod capability;
pub mod config;
mod convert;
pub mod envelope;
mod error;
mod guard;
mod manager;
pub mod prelude;
mod runtime;
pub mod testing;

pub use bindings::BindingError;
pub use bridge::{EventBridge, EventEnvelope};
pub use capability::{Capability, CapabilityRegistry, HostFunction};
pub use config::{AteConfig, ConfigError, ConfigLoader, RuntimeConfig};
pub use envelope::{EnvelopeError, ResponseEnvelope, RpcErrorCode};
pub use error::{BridgeError, RuntimeError};
pub use manager::RuntimeManager;
pub use runtime::ScriptRuntime;
