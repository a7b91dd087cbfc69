//! Stateless helpers exposed to every runtime.
//!
//! | Lua | Rust |
//! |-----|------|
//! | `smath.add/sub/mul/div/mod/exp/isZero/equals` | [`smath`] |
//! | `sutil.stringToHex/hexToString` | [`sutil`] |
//! | `scrypto.sha3` | [`scrypto`] |
//! | `Print/Println/Printf`, `TimeMS`, `json.encode/decode` | [`host`] |
//!
//! Numeric strings are decimal or `0x`-prefixed hex (`0x` alone is zero).
//! Results are minimal lowercase hex with a `0x` prefix.
//!
//! On the Lua side, arithmetic that is undefined (division by zero, a
//! negative difference) yields `NaN`, while unparseable input yields `nil`.
//! The Rust functions report both as [`BindingError`].

pub(crate) mod host;
pub mod scrypto;
pub mod smath;
pub mod sutil;

use ate_types::ErrorCode;
use mlua::{Lua, Value};
use thiserror::Error;

/// Failure of a numeric, crypto or string helper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// The input is not a valid number or hex string.
    #[error("malformed input: {0:?}")]
    Malformed(String),

    /// `div` or `mod` with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,

    /// `sub` whose result would be negative.
    #[error("negative result")]
    Negative,

    /// The exponent does not fit in 32 bits.
    #[error("exponent too large: {0}")]
    Overflow(String),

    /// Empty input where bytes are required.
    #[error("empty input")]
    Empty,
}

impl ErrorCode for BindingError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "BINDING_MALFORMED",
            Self::DivisionByZero => "BINDING_DIVISION_BY_ZERO",
            Self::Negative => "BINDING_NEGATIVE",
            Self::Overflow(_) => "BINDING_OVERFLOW",
            Self::Empty => "BINDING_EMPTY",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}

impl BindingError {
    /// The script-facing form of this failure.
    fn sentinel(&self) -> Value {
        match self {
            Self::DivisionByZero | Self::Negative => Value::Number(f64::NAN),
            Self::Malformed(_) | Self::Overflow(_) | Self::Empty => Value::Nil,
        }
    }
}

/// Installs `smath`, `sutil`, `scrypto` and the host helpers as globals.
pub(crate) fn register(lua: &Lua) -> mlua::Result<()> {
    smath::register(lua)?;
    sutil::register(lua)?;
    scrypto::register(lua)?;
    host::register(lua)
}

/// Converts a helper result into its Lua return value.
fn to_lua<T: mlua::IntoLua>(lua: &Lua, result: Result<T, BindingError>) -> mlua::Result<Value> {
    match result {
        Ok(v) => v.into_lua(lua),
        Err(e) => {
            tracing::debug!(error = %e, "binding returned sentinel");
            Ok(e.sentinel())
        }
    }
}

/// Reads a helper argument as text. Integers are accepted as decimal.
fn text_arg(value: &Value) -> Result<String, BindingError> {
    match value {
        Value::String(s) => s
            .to_str()
            .map(|s| s.to_string())
            .map_err(|_| BindingError::Malformed("<non-utf8>".into())),
        Value::Integer(i) if *i >= 0 => Ok(i.to_string()),
        other => Err(BindingError::Malformed(other.type_name().to_string())),
    }
}

/// Removes a leading `0x` or `0X`, if present.
fn strip_hex_prefix(input: &str) -> Option<&str> {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
}
