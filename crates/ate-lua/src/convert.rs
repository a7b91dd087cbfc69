//! Conversion between Lua values and `serde_json::Value`.
//!
//! Both directions go through mlua's serde bridge. JSON `null` becomes
//! `nil` (not the `NULL` light userdata), and non-finite Lua numbers (the
//! `NaN` sentinel returned by `smath`) become JSON `null`.
//!
//! Lua values are guest-controlled, so tables are checked before export:
//! nesting is bounded by [`MAX_DEPTH`] (which also rejects cycles) and
//! tables mixing a sequence part with other keys are refused.

use mlua::{DeserializeOptions, Lua, LuaSerdeExt, SerializeOptions, Table, Value};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Deepest table nesting accepted on export.
pub(crate) const MAX_DEPTH: usize = 128;

/// Converts JSON into a Lua value.
pub(crate) fn json_to_lua(lua: &Lua, value: &JsonValue) -> mlua::Result<Value> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false)
        .set_array_metatable(false);
    lua.to_value_with(value, options)
}

/// Converts a Lua value into JSON.
///
/// Tables with a non-empty sequence part become arrays, all others objects
/// with string keys. Fails for functions, threads and userdata, for mixed
/// tables such as `{1, 2, x = 3}`, for non-string keys outside a sequence
/// (`{[5] = true}`), and for nesting deeper than
/// [`MAX_DEPTH`] including self-referencing tables.
pub(crate) fn lua_to_json(lua: &Lua, value: Value) -> mlua::Result<JsonValue> {
    if let Value::Table(table) = &value {
        check_tables(table)?;
    }
    let options = DeserializeOptions::new()
        .deny_unsupported_types(true)
        .deny_recursive_tables(true);
    lua.from_value_with(value, options)
}

/// Walks the table graph level by level without recursion.
fn check_tables(root: &Table) -> mlua::Result<()> {
    let mut level = vec![root.clone()];
    for _ in 0..MAX_DEPTH {
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for table in &level {
            let len = table.raw_len();
            for pair in table.clone().pairs::<Value, Value>() {
                let (key, value) = pair?;
                if len > 0 && !is_sequence_key(&key, len) {
                    return Err(mlua::Error::SerializeError(format!(
                        "table mixes a sequence of {len} items with key {}",
                        describe_key(&key)
                    )));
                }
                if len == 0 && !matches!(key, Value::String(_)) {
                    return Err(mlua::Error::SerializeError(format!(
                        "object key {} is not a string",
                        describe_key(&key)
                    )));
                }
                for child in [key, value] {
                    if let Value::Table(t) = child {
                        if seen.insert(t.to_pointer()) {
                            next.push(t);
                        }
                    }
                }
            }
        }
        if next.is_empty() {
            return Ok(());
        }
        level = next;
    }
    Err(mlua::Error::SerializeError(format!(
        "table nesting exceeds {MAX_DEPTH} levels (cyclic table?)"
    )))
}

fn is_sequence_key(key: &Value, len: usize) -> bool {
    match key {
        Value::Integer(i) => usize::try_from(*i).is_ok_and(|i| (1..=len).contains(&i)),
        _ => false,
    }
}

fn describe_key(key: &Value) -> String {
    match key {
        Value::String(s) => format!("'{}'", s.to_string_lossy()),
        Value::Integer(i) => i.to_string(),
        other => other.type_name().to_string(),
    }
}
