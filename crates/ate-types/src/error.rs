//! Unified error-code interface.
//!
//! # Example
//!
//! ```
//! use ate_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum LoadError {
//!     Missing,
//!     Busy,
//! }
//!
//! impl ErrorCode for LoadError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Missing => "LOAD_MISSING",
//!             Self::Busy => "LOAD_BUSY",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Busy)
//!     }
//! }
//!
//! assert_eq!(LoadError::Busy.code(), "LOAD_BUSY");
//! assert!(LoadError::Busy.is_recoverable());
//! ```

/// Machine-readable classification of an error.
///
/// Codes are UPPER_SNAKE_CASE, prefixed with the owning layer
/// (`RUNTIME_`, `EVENT_`, ...) and stable once published.
pub trait ErrorCode {
    /// Returns the stable error code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying (or a caller-side fix at runtime) may succeed.
    ///
    /// Script evaluation failures are recoverable: the runtime stays usable
    /// and the next operation may succeed. Missing runtimes or malformed
    /// configuration are not.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error code is well formed and carries `expected_prefix`.
///
/// # Panics
///
/// Panics if the code is empty, lacks the prefix, or is not UPPER_SNAKE_CASE.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Runs [`assert_error_code`] over every variant in `errors`.
///
/// # Panics
///
/// Panics on the first malformed code.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
