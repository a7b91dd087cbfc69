//! Logging, clock and JSON helpers for scripts.
//!
//! | Function | Description |
//! |----------|-------------|
//! | `Print(...)` | Log arguments concatenated |
//! | `Println(...)` | Log arguments separated by spaces |
//! | `Printf(fmt, ...)` | Log `string.format(fmt, ...)` |
//! | `TimeMS()` | Milliseconds since the Unix epoch |
//! | `json.encode(v)` / `json.decode(s)` | JSON text conversion |
//!
//! Script output is emitted through `tracing` under the `ate::script`
//! target so that it can be filtered independently of host logs.

use crate::convert::{json_to_lua, lua_to_json};
use mlua::{Function, Lua, MultiValue, Table, Value, Variadic};
use std::time::{SystemTime, UNIX_EPOCH};

pub(super) fn register(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set(
        "Print",
        lua.create_function(|lua, args: MultiValue| {
            let line = render(lua, &args, "")?;
            tracing::info!(target: "ate::script", "{line}");
            Ok(())
        })?,
    )?;

    globals.set(
        "Println",
        lua.create_function(|lua, args: MultiValue| {
            let line = render(lua, &args, " ")?;
            tracing::info!(target: "ate::script", "{line}");
            Ok(())
        })?,
    )?;

    globals.set(
        "Printf",
        lua.create_function(|lua, args: Variadic<Value>| {
            if !matches!(args.first(), Some(Value::String(_))) {
                tracing::info!(target: "ate::script", "");
                return Ok(());
            }
            let format: Function = lua.globals().get::<Table>("string")?.get("format")?;
            let line: String = format.call(args)?;
            tracing::info!(target: "ate::script", "{line}");
            Ok(())
        })?,
    )?;

    globals.set("TimeMS", lua.create_function(|_, ()| Ok(now_ms()))?)?;

    let json = lua.create_table()?;
    json.set(
        "encode",
        lua.create_function(|lua, value: Value| {
            let json = lua_to_json(lua, value)?;
            serde_json::to_string(&json).map_err(mlua::Error::external)
        })?,
    )?;
    json.set(
        "decode",
        lua.create_function(|lua, text: String| {
            let json: serde_json::Value =
                serde_json::from_str(&text).map_err(mlua::Error::external)?;
            json_to_lua(lua, &json)
        })?,
    )?;
    globals.set("json", json)
}

fn render(lua: &Lua, args: &MultiValue, separator: &str) -> mlua::Result<String> {
    let parts = args
        .iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.to_string_lossy().to_string()),
            Value::Nil => Ok("nil".to_string()),
            Value::Boolean(b) => Ok(b.to_string()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Number(n) => Ok(n.to_string()),
            other => lua_to_json(lua, other.clone())
                .map(|j| j.to_string())
                .or_else(|_| Ok(format!("<{}>", other.type_name()))),
        })
        .collect::<mlua::Result<Vec<_>>>()?;
    Ok(parts.join(separator))
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
