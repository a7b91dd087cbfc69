//! Keccak-256 hashing of hex-encoded bytes.

use super::{strip_hex_prefix, text_arg, to_lua, BindingError};
use mlua::{Lua, Value};
use sha3::{Digest, Keccak256};

/// Keccak-256 of the bytes encoded by `hex_input` (optional `0x` or `0X` prefix).
///
/// Returns `0x` followed by 64 lowercase hex characters.
///
/// # Errors
///
/// [`BindingError::Empty`] for empty input, [`BindingError::Malformed`]
/// if the input is not valid hex.
pub fn sha3(hex_input: &str) -> Result<String, BindingError> {
    if hex_input.is_empty() {
        return Err(BindingError::Empty);
    }
    let digits = strip_hex_prefix(hex_input).unwrap_or(hex_input);
    let bytes =
        hex::decode(digits).map_err(|_| BindingError::Malformed(hex_input.to_string()))?;
    let digest = Keccak256::digest(&bytes);
    Ok(format!("0x{}", hex::encode(digest)))
}

pub(super) fn register(lua: &Lua) -> mlua::Result<()> {
    let table = lua.create_table()?;
    table.set(
        "sha3",
        lua.create_function(|lua, h: Value| to_lua(lua, text_arg(&h).and_then(|h| sha3(&h))))?,
    )?;
    lua.globals().set("scrypto", table)
}
