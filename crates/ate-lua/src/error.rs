//! Error types for script runtimes and the event bridge.
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`RuntimeError::InitFailed`] | `RUNTIME_INIT_FAILED` | No |
//! | [`RuntimeError::Io`] | `RUNTIME_IO` | Yes |
//! | [`RuntimeError::Evaluation`] | `RUNTIME_EVALUATION` | Yes |
//! | [`RuntimeError::Call`] | `RUNTIME_CALL` | Yes |
//! | [`RuntimeError::Conversion`] | `RUNTIME_CONVERSION` | Yes |
//! | [`RuntimeError::GuestFailure`] | `RUNTIME_GUEST_FAILURE` | Yes |
//! | [`RuntimeError::Timeout`] | `RUNTIME_TIMEOUT` | Yes |
//! | [`RuntimeError::NotFound`] | `RUNTIME_NOT_FOUND` | No |
//! | [`RuntimeError::Inactive`] | `RUNTIME_INACTIVE` | No |
//!
//! Recoverable here means the runtime is still usable: a failed evaluation
//! leaves the VM in place and the next operation may succeed.

use ate_event::EventError;
use ate_types::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`ScriptRuntime`](crate::ScriptRuntime) and
/// [`RuntimeManager`](crate::RuntimeManager) operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The Lua VM or its default bindings could not be set up.
    #[error("runtime '{runtime}' failed to initialize: {message}")]
    InitFailed { runtime: String, message: String },

    /// A script file could not be read.
    #[error("failed to read script '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Script source failed to compile or raised while running.
    #[error("evaluation of '{chunk}' failed in runtime '{runtime}': {message}")]
    Evaluation {
        runtime: String,
        chunk: String,
        message: String,
    },

    /// A function call failed.
    #[error("error when running function '{function}': {message}")]
    Call { function: String, message: String },

    /// Arguments or a return value could not cross the host/script boundary.
    #[error("cannot convert value for '{function}': {message}")]
    Conversion { function: String, message: String },

    /// A guest method raised (or a host callback panicked) and was contained.
    #[error("guest call {object}.{method} failed: {message}")]
    GuestFailure {
        object: String,
        method: String,
        message: String,
    },

    /// A guarded operation exceeded the configured deadline.
    #[error("{operation} in runtime '{runtime}' exceeded {timeout_ms}ms")]
    Timeout {
        runtime: String,
        operation: &'static str,
        timeout_ms: u64,
    },

    /// No runtime is registered under the name.
    #[error("runtime not found: {0}")]
    NotFound(String),

    /// The runtime was shut down.
    #[error("runtime '{0}' is shut down")]
    Inactive(String),
}

impl ErrorCode for RuntimeError {
    fn code(&self) -> &'static str {
        match self {
            Self::InitFailed { .. } => "RUNTIME_INIT_FAILED",
            Self::Io { .. } => "RUNTIME_IO",
            Self::Evaluation { .. } => "RUNTIME_EVALUATION",
            Self::Call { .. } => "RUNTIME_CALL",
            Self::Conversion { .. } => "RUNTIME_CONVERSION",
            Self::GuestFailure { .. } => "RUNTIME_GUEST_FAILURE",
            Self::Timeout { .. } => "RUNTIME_TIMEOUT",
            Self::NotFound(_) => "RUNTIME_NOT_FOUND",
            Self::Inactive(_) => "RUNTIME_INACTIVE",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InitFailed { .. } | Self::NotFound(_) | Self::Inactive(_)
        )
    }
}

/// Errors raised by the event bridge.
///
/// These surface to guest code as Lua errors from `events.subscribe`.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The runtime already has a subscription with this id.
    #[error("subscription id already in use: {0}")]
    DuplicateSubscription(String),

    /// No tokio runtime is available to host the forwarding task.
    #[error("no async runtime available to start forwarding for '{0}'")]
    NoAsyncRuntime(String),

    /// The bus rejected the subscription.
    #[error("event bus rejected subscription: {0}")]
    Bus(#[from] EventError),
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSubscription(_) => "BRIDGE_DUPLICATE_SUBSCRIPTION",
            Self::NoAsyncRuntime(_) => "BRIDGE_NO_ASYNC_RUNTIME",
            Self::Bus(_) => "BRIDGE_BUS",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ate_types::assert_error_codes;

    fn runtime_variants() -> Vec<RuntimeError> {
        vec![
            RuntimeError::InitFailed {
                runtime: "a".into(),
                message: "m".into(),
            },
            RuntimeError::Io {
                path: PathBuf::from("x.lua"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            },
            RuntimeError::Evaluation {
                runtime: "a".into(),
                chunk: "c".into(),
                message: "m".into(),
            },
            RuntimeError::Call {
                function: "f".into(),
                message: "m".into(),
            },
            RuntimeError::Conversion {
                function: "f".into(),
                message: "m".into(),
            },
            RuntimeError::GuestFailure {
                object: "o".into(),
                method: "m".into(),
                message: "boom".into(),
            },
            RuntimeError::Timeout {
                runtime: "a".into(),
                operation: "add_script",
                timeout_ms: 5,
            },
            RuntimeError::NotFound("a".into()),
            RuntimeError::Inactive("a".into()),
        ]
    }

    #[test]
    fn all_runtime_codes_valid() {
        assert_error_codes(&runtime_variants(), "RUNTIME_");
    }

    #[test]
    fn all_bridge_codes_valid() {
        assert_error_codes(
            &[
                BridgeError::DuplicateSubscription("s".into()),
                BridgeError::NoAsyncRuntime("s".into()),
                BridgeError::Bus(EventError::BusClosed),
            ],
            "BRIDGE_",
        );
    }

    #[test]
    fn lifecycle_errors_are_not_recoverable() {
        assert!(!RuntimeError::NotFound("a".into()).is_recoverable());
        assert!(!RuntimeError::Inactive("a".into()).is_recoverable());
        assert!(RuntimeError::Call {
            function: "f".into(),
            message: "m".into()
        }
        .is_recoverable());
    }

    #[test]
    fn call_error_names_function() {
        let err = RuntimeError::Call {
            function: "receive".into(),
            message: "attempt to call a nil value".into(),
        };
        assert!(err.to_string().contains("'receive'"));
        assert!(err.to_string().contains("nil value"));
    }
}
