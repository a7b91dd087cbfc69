//! Event bridge: bus subscriptions delivered into a script runtime.
//!
//! Each subscription owns one tokio task:
//!
//! ```text
//!   bus ──Event──► forward task ──spawn_blocking──► ScriptRuntime
//!                  (one per id)   call_method_on_object("events", "post",
//!                                   [subscriptionId, envelopeJson])
//! ```
//!
//! The task awaits each delivery before receiving the next event, so events
//! of one subscription reach the script in bus order. Deliveries of
//! different subscriptions are not ordered relative to each other, and all
//! of them queue on the runtime's execution guard: a slow callback delays
//! every subscription of the same runtime.
//!
//! A task ends when the bus closes its channel, when [`EventBridge::unsubscribe`]
//! fires its close signal, or when the runtime is gone or shut down.

use crate::error::{BridgeError, RuntimeError};
use crate::runtime::ScriptRuntime;
use ate_event::{Event, EventReceiver, EventRegistry, SubscriptionFilter};
use mlua::Lua;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

/// Global table through which the preludes reach the bridge.
pub(crate) const HOST_TABLE: &str = "ate_events";

/// Script object and method that receive delivered events.
pub(crate) const DISPATCH_OBJECT: &str = "events";
pub(crate) const DISPATCH_METHOD: &str = "post";

/// The JSON document handed to `events.post` for each event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub payload: JsonValue,
    pub subscription_id: String,
}

impl EventEnvelope {
    /// Wraps `event` for delivery on `subscription_id`.
    #[must_use]
    pub fn new(event: &Event, subscription_id: &str) -> Self {
        Self {
            source: event.source.clone(),
            event_type: event.event_type.clone(),
            target: event.target.clone(),
            payload: event.payload.clone(),
            subscription_id: subscription_id.to_string(),
        }
    }
}

struct ActiveSubscription {
    filter: SubscriptionFilter,
    serial: u64,
    close: oneshot::Sender<()>,
}

/// Subscriptions of one runtime.
pub struct EventBridge {
    runtime_name: String,
    bus: Arc<dyn EventRegistry>,
    handle: Option<Handle>,
    runtime: OnceLock<Weak<ScriptRuntime>>,
    subscriptions: Mutex<HashMap<String, ActiveSubscription>>,
    next_serial: AtomicU64,
}

impl EventBridge {
    pub(crate) fn new(
        runtime_name: impl Into<String>,
        bus: Arc<dyn EventRegistry>,
        handle: Option<Handle>,
    ) -> Self {
        Self {
            runtime_name: runtime_name.into(),
            bus,
            handle,
            runtime: OnceLock::new(),
            subscriptions: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(0),
        }
    }

    pub(crate) fn attach(&self, runtime: Weak<ScriptRuntime>) {
        if self.runtime.set(runtime).is_err() {
            warn!(runtime = %self.runtime_name, "bridge already attached");
        }
    }

    /// Subscribes to `(source, event_type, target)` and starts forwarding.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::DuplicateSubscription`] if the id is active
    /// - [`BridgeError::NoAsyncRuntime`] if no tokio runtime can host the task
    /// - [`BridgeError::Bus`] if the bus rejects the subscription
    pub fn subscribe(
        self: &Arc<Self>,
        source: impl Into<String>,
        event_type: impl Into<String>,
        target: Option<String>,
        subscription_id: &str,
    ) -> Result<(), BridgeError> {
        let handle = self
            .handle
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or_else(|| BridgeError::NoAsyncRuntime(subscription_id.to_string()))?;
        let runtime = self.runtime.get().cloned().unwrap_or_default();

        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(subscription_id) {
            return Err(BridgeError::DuplicateSubscription(
                subscription_id.to_string(),
            ));
        }

        let filter = SubscriptionFilter::new(source, event_type, target, subscription_id);
        let rx = self.bus.subscribe(filter.clone())?;
        let (close_tx, close_rx) = oneshot::channel();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);

        info!(
            runtime = %self.runtime_name,
            subscription = %subscription_id,
            source = %filter.source,
            event_type = %filter.event_type,
            target = ?filter.target,
            "subscribed"
        );
        subscriptions.insert(
            subscription_id.to_string(),
            ActiveSubscription {
                filter,
                serial,
                close: close_tx,
            },
        );
        drop(subscriptions);

        handle.spawn(forward(
            Arc::clone(self),
            runtime,
            subscription_id.to_string(),
            serial,
            rx,
            close_rx,
        ));
        Ok(())
    }

    /// Stops delivery for `subscription_id`.
    ///
    /// Idempotent. Returns immediately; an in-flight delivery completes and
    /// the task ends afterwards.
    pub fn unsubscribe(&self, subscription_id: &str) {
        let removed = self.subscriptions.lock().remove(subscription_id);
        self.bus.unsubscribe(subscription_id);
        if let Some(sub) = removed {
            let _ = sub.close.send(());
            debug!(
                runtime = %self.runtime_name,
                subscription = %subscription_id,
                "unsubscribed"
            );
        }
    }

    /// Cancels every subscription. Returns how many were active.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.subscriptions.lock().drain().collect();
        let count = drained.len();
        for (id, sub) in drained {
            self.bus.unsubscribe(&id);
            let _ = sub.close.send(());
        }
        if count > 0 {
            info!(runtime = %self.runtime_name, count, "cancelled subscriptions");
        }
        count
    }

    /// Ids of active subscriptions, sorted.
    #[must_use]
    pub fn subscription_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.subscriptions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Filter of an active subscription.
    #[must_use]
    pub fn filter(&self, subscription_id: &str) -> Option<SubscriptionFilter> {
        self.subscriptions
            .lock()
            .get(subscription_id)
            .map(|s| s.filter.clone())
    }

    /// Removes the entry if it still belongs to the task with `serial`.
    fn forget(&self, subscription_id: &str, serial: u64) {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions
            .get(subscription_id)
            .is_some_and(|s| s.serial == serial)
        {
            subscriptions.remove(subscription_id);
            drop(subscriptions);
            self.bus.unsubscribe(subscription_id);
        }
    }
}

async fn forward(
    bridge: Arc<EventBridge>,
    runtime: Weak<ScriptRuntime>,
    subscription_id: String,
    serial: u64,
    mut rx: EventReceiver,
    mut close: oneshot::Receiver<()>,
) {
    debug!(subscription = %subscription_id, "forwarding started");
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut close => {
                debug!(subscription = %subscription_id, "close signal received");
                break;
            }
            next = rx.recv() => match next {
                Some(event) => event,
                None => {
                    info!(subscription = %subscription_id, "event channel closed");
                    break;
                }
            },
        };

        let Some(target) = runtime.upgrade() else {
            debug!(subscription = %subscription_id, "runtime dropped, stopping");
            break;
        };
        if !deliver(target, &subscription_id, &event).await {
            break;
        }
    }
    bridge.forget(&subscription_id, serial);
    debug!(subscription = %subscription_id, "forwarding stopped");
}

/// Delivers one event. Returns `false` when forwarding should stop.
async fn deliver(runtime: Arc<ScriptRuntime>, subscription_id: &str, event: &Event) -> bool {
    let envelope = match serde_json::to_string(&EventEnvelope::new(event, subscription_id)) {
        Ok(json) => json,
        Err(e) => {
            warn!(subscription = %subscription_id, error = %e, "cannot encode event, skipped");
            return true;
        }
    };
    let args = vec![
        JsonValue::String(subscription_id.to_string()),
        JsonValue::String(envelope),
    ];

    let joined = tokio::task::spawn_blocking(move || {
        runtime.call_method_on_object(DISPATCH_OBJECT, DISPATCH_METHOD, args)
    })
    .await;

    match joined {
        Ok(Ok(_)) => {
            trace!(subscription = %subscription_id, "event delivered");
            true
        }
        Ok(Err(RuntimeError::Inactive(name))) => {
            debug!(subscription = %subscription_id, runtime = %name, "runtime inactive, stopping");
            false
        }
        Ok(Err(e)) => {
            warn!(subscription = %subscription_id, error = %e, "event callback failed");
            true
        }
        Err(e) => {
            error!(subscription = %subscription_id, error = %e, "delivery task failed");
            false
        }
    }
}

/// Installs the `ate_events` host table used by the `events` prelude.
pub(crate) fn register(lua: &Lua, bridge: &Arc<EventBridge>) -> mlua::Result<()> {
    let table = lua.create_table()?;

    let b = Arc::clone(bridge);
    table.set(
        "subscribe",
        lua.create_function(
            move |_, (source, event_type, target, id): (String, String, Option<String>, String)| {
                b.subscribe(source, event_type, target, &id)
                    .map_err(mlua::Error::external)
            },
        )?,
    )?;

    let b = Arc::clone(bridge);
    table.set(
        "unsubscribe",
        lua.create_function(move |_, id: String| {
            b.unsubscribe(&id);
            Ok(())
        })?,
    )?;

    lua.globals().set(HOST_TABLE, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ate_event::LocalEventBus;
    use serde_json::json;

    fn bridge(bus: &Arc<LocalEventBus>) -> Arc<EventBridge> {
        Arc::new(EventBridge::new(
            "test",
            Arc::clone(bus) as Arc<dyn EventRegistry>,
            None,
        ))
    }

    #[test]
    fn envelope_fields() {
        let event = Event::new("chain", "newBlock", json!({"n": 1})).with_target("app");
        let value = serde_json::to_value(EventEnvelope::new(&event, "sub-1")).expect("encode");
        assert_eq!(
            value,
            json!({
                "source": "chain",
                "type": "newBlock",
                "target": "app",
                "payload": {"n": 1},
                "subscriptionId": "sub-1",
            })
        );
    }

    #[test]
    fn envelope_without_target() {
        let event = Event::new("chain", "tx", json!(null));
        let text = serde_json::to_string(&EventEnvelope::new(&event, "s")).expect("encode");
        assert!(!text.contains("target"));
    }

    #[test]
    fn subscribe_without_async_runtime_fails() {
        let bus = Arc::new(LocalEventBus::new());
        let bridge = bridge(&bus);
        let err = bridge
            .subscribe("chain", "newBlock", None, "s1")
            .expect_err("no tokio runtime");
        assert!(matches!(err, BridgeError::NoAsyncRuntime(_)));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let bus = Arc::new(LocalEventBus::new());
        let bridge = bridge(&bus);
        bridge
            .subscribe("chain", "newBlock", None, "s1")
            .expect("first subscribe");
        let err = bridge
            .subscribe("chain", "other", None, "s1")
            .expect_err("duplicate");
        assert!(matches!(err, BridgeError::DuplicateSubscription(_)));
        assert_eq!(bridge.subscription_ids(), ["s1"]);
        assert_eq!(
            bridge.filter("s1").map(|f| f.event_type),
            Some("newBlock".to_string())
        );
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus = Arc::new(LocalEventBus::new());
        let bridge = bridge(&bus);
        bridge
            .subscribe("chain", "newBlock", None, "s1")
            .expect("subscribe");
        assert!(bus.is_subscribed("s1"));

        bridge.unsubscribe("s1");
        bridge.unsubscribe("s1");
        bridge.unsubscribe("never-existed");

        assert!(!bus.is_subscribed("s1"));
        assert!(bridge.subscription_ids().is_empty());
    }

    #[tokio::test]
    async fn cancel_all_clears_bus_and_bridge() {
        let bus = Arc::new(LocalEventBus::new());
        let bridge = bridge(&bus);
        bridge.subscribe("a", "x", None, "s1").expect("subscribe");
        bridge.subscribe("b", "y", None, "s2").expect("subscribe");

        assert_eq!(bridge.cancel_all(), 2);
        assert_eq!(bus.subscription_count(), 0);
        assert_eq!(bridge.cancel_all(), 0);
    }
}
