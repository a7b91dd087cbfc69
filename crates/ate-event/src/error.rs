//! Event bus errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`EventError::DuplicateSubscription`] | `EVENT_DUPLICATE_SUBSCRIPTION` | No |
//! | [`EventError::BusClosed`] | `EVENT_BUS_CLOSED` | No |

use ate_types::ErrorCode;
use thiserror::Error;

/// Errors returned by an [`EventRegistry`](crate::EventRegistry).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    /// A subscription with this id is already registered on the bus.
    #[error("subscription already registered: {0}")]
    DuplicateSubscription(String),

    /// The bus no longer accepts subscriptions.
    #[error("event bus is closed")]
    BusClosed,
}

impl ErrorCode for EventError {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSubscription(_) => "EVENT_DUPLICATE_SUBSCRIPTION",
            Self::BusClosed => "EVENT_BUS_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
