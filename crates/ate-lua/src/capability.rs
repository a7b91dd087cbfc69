//! Host capabilities injected into script runtimes.
//!
//! A [`Capability`] is a JSON value, a host function, or an object whose
//! members are capabilities. The [`CapabilityRegistry`] holds the named
//! capabilities that the [`RuntimeManager`](crate::RuntimeManager) binds
//! into each runtime at creation time. Registration is not retroactive:
//! runtimes created earlier never see later capabilities.
//!
//! # Example
//!
//! ```
//! use ate_lua::Capability;
//! use serde_json::{json, Value};
//!
//! let chain = Capability::object([
//!     ("network", Capability::value("testnet")),
//!     (
//!         "double",
//!         Capability::function(|args| {
//!             let n = args.first().and_then(Value::as_i64).ok_or("expected a number")?;
//!             Ok(json!(n * 2))
//!         }),
//!     ),
//! ]);
//! assert!(chain.member("double").is_some());
//! ```

use crate::convert::{json_to_lua, lua_to_json};
use mlua::{Lua, MultiValue, Value};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a host function callable from scripts.
///
/// Arguments arrive as JSON; an `Err` is raised in the script as a Lua error.
pub type HostFunction = Arc<dyn Fn(Vec<JsonValue>) -> Result<JsonValue, String> + Send + Sync>;

/// A host value exposed to scripts.
#[derive(Clone)]
pub enum Capability {
    /// Plain data, converted to a Lua value.
    Value(JsonValue),
    /// A function implemented by the host.
    Function(HostFunction),
    /// A table of named members.
    Object(BTreeMap<String, Capability>),
}

impl Capability {
    /// Wraps plain data.
    pub fn value(value: impl Into<JsonValue>) -> Self {
        Self::Value(value.into())
    }

    /// Wraps a host function.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Vec<JsonValue>) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    /// Builds an object from named members.
    pub fn object<K, I>(members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Capability)>,
    {
        Self::Object(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Looks up a member of an object capability.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Capability> {
        match self {
            Self::Object(members) => members.get(name),
            _ => None,
        }
    }

    /// Converts into a Lua value owned by `lua`.
    pub(crate) fn to_lua(&self, lua: &Lua) -> mlua::Result<Value> {
        match self {
            Self::Value(v) => json_to_lua(lua, v),
            Self::Function(f) => {
                let f = Arc::clone(f);
                let func = lua.create_function(move |lua, args: MultiValue| {
                    let args = args
                        .into_iter()
                        .map(|v| lua_to_json(lua, v))
                        .collect::<mlua::Result<Vec<_>>>()?;
                    let out = f(args).map_err(mlua::Error::RuntimeError)?;
                    json_to_lua(lua, &out)
                })?;
                Ok(Value::Function(func))
            }
            Self::Object(members) => {
                let table = lua.create_table()?;
                for (name, member) in members {
                    table.set(name.as_str(), member.to_lua(lua)?)?;
                }
                Ok(Value::Table(table))
            }
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Object(members) => f.debug_tuple("Object").field(members).finish(),
        }
    }
}

impl From<JsonValue> for Capability {
    fn from(value: JsonValue) -> Self {
        Self::Value(value)
    }
}

/// Named capabilities applied to runtimes at creation.
///
/// Re-registering a name replaces the capability for runtimes created
/// afterwards.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: RwLock<BTreeMap<String, Capability>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a capability.
    pub fn register(&self, name: impl Into<String>, capability: Capability) {
        let name = name.into();
        tracing::debug!(capability = %name, "registered capability");
        self.entries.write().insert(name, capability);
    }

    /// Returns a copy of the current entries, in name order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Capability)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether a capability is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_capability_becomes_table() {
        let lua = Lua::new();
        let cap = Capability::value(json!({"chain": "main", "id": 1}));
        lua.globals()
            .set("cfg", cap.to_lua(&lua).expect("to lua"))
            .expect("set");
        let chain: String = lua.load("return cfg.chain").eval().expect("eval");
        assert_eq!(chain, "main");
    }

    #[test]
    fn function_capability_is_callable() {
        let lua = Lua::new();
        let cap = Capability::function(|args| {
            let total: i64 = args.iter().filter_map(JsonValue::as_i64).sum();
            Ok(json!(total))
        });
        lua.globals()
            .set("sum", cap.to_lua(&lua).expect("to lua"))
            .expect("set");
        let total: i64 = lua.load("return sum(1, 2, 3)").eval().expect("eval");
        assert_eq!(total, 6);
    }

    #[test]
    fn function_error_raises_in_script() {
        let lua = Lua::new();
        let cap = Capability::function(|_| Err("denied".to_string()));
        lua.globals()
            .set("deny", cap.to_lua(&lua).expect("to lua"))
            .expect("set");
        let err = lua.load("deny()").exec().expect_err("should raise");
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn object_members_nest() {
        let lua = Lua::new();
        let cap = Capability::object([
            ("name", Capability::value("node")),
            ("inner", Capability::object([("n", Capability::value(5))])),
        ]);
        assert!(cap.member("inner").is_some());
        assert!(cap.member("missing").is_none());
        lua.globals()
            .set("obj", cap.to_lua(&lua).expect("to lua"))
            .expect("set");
        let n: i64 = lua.load("return obj.inner.n").eval().expect("eval");
        assert_eq!(n, 5);
    }

    #[test]
    fn registry_replaces_and_snapshots_in_order() {
        let registry = CapabilityRegistry::new();
        assert!(registry.is_empty());
        registry.register("b", Capability::value(1));
        registry.register("a", Capability::value(2));
        registry.register("b", Capability::value(3));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        let names: Vec<_> = registry.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["a", "b"]);
        match &registry.snapshot()[1].1 {
            Capability::Value(v) => assert_eq!(v, &json!(3)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
