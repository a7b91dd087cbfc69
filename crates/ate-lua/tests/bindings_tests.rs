//! Numeric, hex and hashing helpers as seen from scripts and from Rust.

use ate_lua::bindings::{scrypto, smath, sutil};
use ate_lua::testing::RuntimeHarness;
use ate_lua::{BindingError, ScriptRuntime};
use serde_json::{json, Value};
use std::sync::Arc;

fn runtime() -> (RuntimeHarness, Arc<ScriptRuntime>) {
    let harness = RuntimeHarness::new();
    let rt = harness
        .runtime_with_script(
            "math",
            r#"
            function eval(expr)
                local f = load("return " .. expr)
                local r = f()
                if r ~= r then return "NaN" end
                if r == nil then return "nil" end
                return r
            end
        "#,
        )
        .expect("runtime");
    (harness, rt)
}

fn eval(rt: &ScriptRuntime, expr: &str) -> Value {
    rt.call_function("eval", vec![json!(expr)])
        .unwrap_or_else(|e| panic!("{expr}: {e}"))
}

// =============================================================================
// smath
// =============================================================================

mod math {
    use super::*;

    #[test]
    fn documented_results() {
        let (_h, rt) = runtime();
        assert_eq!(eval(&rt, r#"smath.add("0x1", "0x1")"#), json!("0x2"));
        assert_eq!(eval(&rt, r#"smath.isZero("0")"#), json!(true));
        assert_eq!(eval(&rt, r#"smath.isZero("0x0")"#), json!(true));
        assert_eq!(eval(&rt, r#"smath.isZero("0x1")"#), json!(false));
        assert_eq!(eval(&rt, r#"smath.equals("10", "0xa")"#), json!(true));
    }

    #[test]
    fn division_by_zero_is_a_sentinel_for_any_dividend() {
        let (_h, rt) = runtime();
        for x in ["0", "1", "0xff", "123456789012345678901234567890"] {
            assert_eq!(eval(&rt, &format!(r#"smath.div("{x}", "0x0")"#)), json!("NaN"));
            assert_eq!(eval(&rt, &format!(r#"smath.mod("{x}", "0x0")"#)), json!("NaN"));
        }
    }

    #[test]
    fn negative_and_malformed() {
        let (_h, rt) = runtime();
        assert_eq!(eval(&rt, r#"smath.sub("0x1", "0x2")"#), json!("NaN"));
        assert_eq!(eval(&rt, r#"smath.add("one", "1")"#), json!("nil"));
        assert_eq!(eval(&rt, r#"smath.exp("2", "0x1ffffffff")"#), json!("nil"));
    }

    #[test]
    fn nan_result_exports_as_null() {
        let (_h, rt) = runtime();
        rt.add_script(r#"function raw_div(a, b) return smath.div(a, b) end"#)
            .expect("script");
        assert_eq!(
            rt.call_function("raw_div", vec![json!("1"), json!("0")]).expect("call"),
            Value::Null
        );
    }

    #[test]
    fn rust_api_reports_typed_errors() {
        assert_eq!(smath::exp("0x2", "0x8").as_deref(), Ok("0x100"));
        assert_eq!(smath::div("7", "0"), Err(BindingError::DivisionByZero));
        assert_eq!(smath::sub("0", "1"), Err(BindingError::Negative));
        assert!(matches!(smath::mul("x", "1"), Err(BindingError::Malformed(_))));
    }
}

// =============================================================================
// sutil
// =============================================================================

mod hex_strings {
    use super::*;

    #[test]
    fn string_to_hex_is_a_padded_word() {
        let (_h, rt) = runtime();
        let out = eval(&rt, r#"sutil.stringToHex("AB")"#);
        let hex = out.as_str().expect("string");
        assert_eq!(hex.len(), 2 + 64);
        assert!(hex.ends_with("4142"));
    }

    #[test]
    fn hex_to_string_inverts_string_to_hex() {
        let (_h, rt) = runtime();
        for s in ["A", "AB", "hello world", &"z".repeat(32)] {
            let expr = format!(r#"sutil.hexToString(sutil.stringToHex("{s}"))"#);
            assert_eq!(eval(&rt, &expr), json!(s), "{s}");
        }
        for s in ["", "dapp", "0123456789abcdef0123456789abcdef"] {
            assert_eq!(sutil::hex_to_string(&sutil::string_to_hex(s)).as_deref(), Ok(s));
        }
    }

    #[test]
    fn zero_forms() {
        let (_h, rt) = runtime();
        for z in ["", "0", "0x", "0x0"] {
            assert_eq!(eval(&rt, &format!(r#"sutil.hexToString("{z}")"#)), json!(""));
        }
    }
}

// =============================================================================
// scrypto
// =============================================================================

mod hashing {
    use super::*;

    #[test]
    fn repeated_hashes_are_identical() {
        let (_h, rt) = runtime();
        let first = eval(&rt, r#"scrypto.sha3("0xdeadbeef")"#);
        for _ in 0..5 {
            assert_eq!(eval(&rt, r#"scrypto.sha3("0xdeadbeef")"#), first);
        }
        assert_eq!(first, json!(scrypto::sha3("deadbeef").expect("hash")));
    }

    #[test]
    fn empty_input_is_nil_not_a_crash() {
        let (_h, rt) = runtime();
        assert_eq!(eval(&rt, r#"scrypto.sha3("")"#), json!("nil"));
        assert_eq!(eval(&rt, r#"scrypto.sha3("0xnothex")"#), json!("nil"));
        assert_eq!(scrypto::sha3(""), Err(BindingError::Empty));
    }
}
