//! Event and subscription filter types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable event delivered by the platform bus.
///
/// `target` is optional and only participates in subscription filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Emitting module (e.g. `"chain"`, `"ipfs"`).
    pub source: String,
    /// Event type within the source (e.g. `"newBlock"`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Optional addressee, such as an account or a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Arbitrary event data.
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    /// Creates an untargeted event.
    #[must_use]
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            source: source.into(),
            event_type: event_type.into(),
            target: None,
            payload,
        }
    }

    /// Sets the event target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Subscription descriptor handed to [`EventRegistry::subscribe`](crate::EventRegistry::subscribe).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// Unique subscription id (unique per bus).
    pub id: String,
    /// Required event source.
    pub source: String,
    /// Required event type.
    pub event_type: String,
    /// Required target; `None` accepts any target.
    pub target: Option<String>,
}

impl SubscriptionFilter {
    /// Creates a filter. An empty `target` is treated as "any target".
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        target: Option<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            event_type: event_type.into(),
            target: target.filter(|t| !t.is_empty()),
        }
    }

    /// Returns true if `event` should be delivered to this subscription.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if self.source != event.source || self.event_type != event.event_type {
            return false;
        }
        match &self.target {
            None => true,
            Some(target) => event.target.as_deref() == Some(target.as_str()),
        }
    }
}
