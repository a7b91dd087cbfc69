//! Shared types for the ate workspace.
//!
//! Every error enum in the workspace implements [`ErrorCode`], so hosts can
//! log and branch on stable, machine-readable codes regardless of which layer
//! produced the failure:
//!
//! | Crate | Prefix |
//! |-------|--------|
//! | `ate-event` | `EVENT_` |
//! | `ate-lua` (runtime) | `RUNTIME_` |
//! | `ate-lua` (bridge) | `BRIDGE_` |
//! | `ate-lua` (bindings) | `BINDING_` |

mod error;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
