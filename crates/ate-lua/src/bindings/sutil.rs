//! Conversion between strings and 32-byte hex words.

use super::{strip_hex_prefix, text_arg, to_lua, BindingError};
use mlua::{Lua, Value};

const WORD_LEN: usize = 32;

/// Encodes `s` as `0x` hex, left-padded with zero bytes to 32 bytes.
///
/// Inputs of 32 bytes or more are encoded without padding.
#[must_use]
pub fn string_to_hex(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut word = vec![0u8; WORD_LEN.saturating_sub(bytes.len())];
    word.extend_from_slice(bytes);
    format!("0x{}", hex::encode(word))
}

/// Decodes a hex word back into a string, dropping leading zero bytes.
///
/// `""`, `"0"`, `"0x"` and `"0x0"` (either prefix case) decode to the
/// empty string.
///
/// # Errors
///
/// [`BindingError::Malformed`] if the input is not valid hex or the
/// decoded bytes are not UTF-8.
pub fn hex_to_string(h: &str) -> Result<String, BindingError> {
    let digits = strip_hex_prefix(h).unwrap_or(h);
    if matches!(digits, "" | "0") {
        return Ok(String::new());
    }
    let bytes = hex::decode(digits).map_err(|_| BindingError::Malformed(h.to_string()))?;
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[start..].to_vec()).map_err(|_| BindingError::Malformed(h.to_string()))
}

pub(super) fn register(lua: &Lua) -> mlua::Result<()> {
    let table = lua.create_table()?;
    table.set(
        "stringToHex",
        lua.create_function(|lua, s: Value| to_lua(lua, text_arg(&s).map(|s| string_to_hex(&s))))?,
    )?;
    table.set(
        "hexToString",
        lua.create_function(|lua, h: Value| {
            to_lua(lua, text_arg(&h).and_then(|h| hex_to_string(&h)))
        })?,
    )?;
    lua.globals().set("sutil", table)
}
