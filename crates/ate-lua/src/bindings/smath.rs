//! Arbitrary-precision arithmetic on numeric strings.

use super::{strip_hex_prefix, text_arg, to_lua, BindingError};
use mlua::{Lua, Value};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

/// Parses a decimal or `0x`/`0X`-prefixed hex string.
///
/// `"0x"` alone parses to zero.
///
/// # Errors
///
/// Returns [`BindingError::Malformed`] for anything else.
pub fn parse(input: &str) -> Result<BigUint, BindingError> {
    let malformed = || BindingError::Malformed(input.to_string());
    let (digits, radix) = match strip_hex_prefix(input) {
        Some("") => return Ok(BigUint::zero()),
        Some(hex) => (hex, 16),
        None => (input, 10),
    };
    let valid = !digits.is_empty()
        && digits.bytes().all(|b| match radix {
            16 => b.is_ascii_hexdigit(),
            _ => b.is_ascii_digit(),
        });
    if !valid {
        return Err(malformed());
    }
    BigUint::parse_bytes(digits.as_bytes(), radix).ok_or_else(malformed)
}

/// Formats as minimal lowercase hex with a `0x` prefix.
#[must_use]
pub fn to_hex(value: &BigUint) -> String {
    format!("0x{value:x}")
}

fn binary(
    a: &str,
    b: &str,
    op: impl FnOnce(BigUint, BigUint) -> Result<BigUint, BindingError>,
) -> Result<String, BindingError> {
    let result = op(parse(a)?, parse(b)?)?;
    Ok(to_hex(&result))
}

/// `a + b`.
pub fn add(a: &str, b: &str) -> Result<String, BindingError> {
    binary(a, b, |a, b| Ok(a + b))
}

/// `a - b`. A negative result is an error.
pub fn sub(a: &str, b: &str) -> Result<String, BindingError> {
    binary(a, b, |a, b| {
        if b > a {
            return Err(BindingError::Negative);
        }
        Ok(a - b)
    })
}

/// `a * b`.
pub fn mul(a: &str, b: &str) -> Result<String, BindingError> {
    binary(a, b, |a, b| Ok(a * b))
}

/// Integer division `a / b`.
pub fn div(a: &str, b: &str) -> Result<String, BindingError> {
    binary(a, b, |a, b| {
        if b.is_zero() {
            return Err(BindingError::DivisionByZero);
        }
        Ok(a / b)
    })
}

/// Remainder `a % b`.
pub fn modulo(a: &str, b: &str) -> Result<String, BindingError> {
    binary(a, b, |a, b| {
        if b.is_zero() {
            return Err(BindingError::DivisionByZero);
        }
        Ok(a % b)
    })
}

/// Largest result [`exp`] computes, in bits.
pub const MAX_EXP_RESULT_BITS: u64 = 1 << 20;

/// `a ^ b`.
///
/// The exponent must fit in a `u32`, and `bits(a) * b` must not exceed
/// [`MAX_EXP_RESULT_BITS`]; otherwise the result is
/// [`BindingError::Overflow`].
pub fn exp(a: &str, b: &str) -> Result<String, BindingError> {
    binary(a, b, |a, b| {
        let exponent = b
            .to_u32()
            .ok_or_else(|| BindingError::Overflow(b.to_string()))?;
        if exponent > 1 && a.bits() > 1 {
            let bound = a.bits().saturating_mul(u64::from(exponent));
            if bound > MAX_EXP_RESULT_BITS {
                return Err(BindingError::Overflow(format!(
                    "result of up to {bound} bits exceeds {MAX_EXP_RESULT_BITS}"
                )));
            }
        }
        Ok(a.pow(exponent))
    })
}

/// Whether `x` denotes zero in either base.
pub fn is_zero(x: &str) -> Result<bool, BindingError> {
    Ok(parse(x)?.is_zero())
}

/// Numeric equality regardless of base or formatting.
pub fn equals(a: &str, b: &str) -> Result<bool, BindingError> {
    Ok(parse(a)? == parse(b)?)
}

pub(super) fn register(lua: &Lua) -> mlua::Result<()> {
    type BinaryOp = fn(&str, &str) -> Result<String, BindingError>;
    let table = lua.create_table()?;

    let ops: [(&str, BinaryOp); 6] = [
        ("add", add),
        ("sub", sub),
        ("mul", mul),
        ("div", div),
        ("mod", modulo),
        ("exp", exp),
    ];
    for (name, op) in ops {
        let f = lua.create_function(move |lua, (a, b): (Value, Value)| {
            let result = text_arg(&a).and_then(|a| op(&a, &text_arg(&b)?));
            to_lua(lua, result)
        })?;
        table.set(name, f)?;
    }

    table.set(
        "isZero",
        lua.create_function(|lua, x: Value| to_lua(lua, text_arg(&x).and_then(|x| is_zero(&x))))?,
    )?;
    table.set(
        "equals",
        lua.create_function(|lua, (a, b): (Value, Value)| {
            let result = text_arg(&a).and_then(|a| equals(&a, &text_arg(&b)?));
            to_lua(lua, result)
        })?,
    )?;

    lua.globals().set("smath", table)
}
