//! Bus contract and the in-process [`LocalEventBus`].

use crate::error::EventError;
use crate::event::{Event, SubscriptionFilter};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Receiving half of a subscription channel.
///
/// `recv()` yields `None` once the bus closes the subscription.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// The subscribe / unsubscribe contract of the platform event bus.
///
/// Implementations must deliver only events matching the filter, preserve
/// publish order within one subscription, and close the channel to signal
/// end of stream.
pub trait EventRegistry: Send + Sync {
    /// Registers a subscription and returns its dedicated channel.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DuplicateSubscription`] if the id is taken,
    /// or [`EventError::BusClosed`] if the bus has shut down.
    fn subscribe(&self, filter: SubscriptionFilter) -> Result<EventReceiver, EventError>;

    /// Stops delivery for `id` and closes its channel.
    ///
    /// Unknown ids are ignored, which makes the call idempotent.
    fn unsubscribe(&self, id: &str);
}

struct Registration {
    filter: SubscriptionFilter,
    tx: mpsc::UnboundedSender<Event>,
}

/// In-process event bus.
///
/// Channels are unbounded: `publish` never blocks, and backpressure is left
/// to the consumer side (the bridge waits on the runtime's execution guard).
#[derive(Default)]
pub struct LocalEventBus {
    registrations: RwLock<HashMap<String, Registration>>,
    closed: RwLock<bool>,
}

impl LocalEventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every matching subscription.
    ///
    /// Returns the number of subscriptions the event was queued for.
    /// Subscriptions whose receiver has been dropped are pruned.
    pub fn publish(&self, event: &Event) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let regs = self.registrations.read();
            for (id, reg) in regs.iter() {
                if !reg.filter.matches(event) {
                    continue;
                }
                if reg.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(id.clone());
                }
            }
        }
        if !dead.is_empty() {
            let mut regs = self.registrations.write();
            for id in dead {
                debug!(subscription = %id, "pruning subscription with dropped receiver");
                regs.remove(&id);
            }
        }
        trace!(
            source = %event.source,
            event_type = %event.event_type,
            delivered,
            "published event"
        );
        delivered
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registrations.read().len()
    }

    /// Returns true if a subscription with `id` is registered.
    #[must_use]
    pub fn is_subscribed(&self, id: &str) -> bool {
        self.registrations.read().contains_key(id)
    }

    /// Closes every subscription channel and rejects new subscriptions.
    pub fn close(&self) {
        let mut regs = self.registrations.write();
        *self.closed.write() = true;
        let drained = std::mem::take(&mut *regs);
        drop(regs);
        debug!(count = drained.len(), "event bus closed");
    }
}

impl EventRegistry for LocalEventBus {
    fn subscribe(&self, filter: SubscriptionFilter) -> Result<EventReceiver, EventError> {
        // `closed` is only set while `registrations` is write-locked.
        let mut regs = self.registrations.write();
        if *self.closed.read() {
            return Err(EventError::BusClosed);
        }
        if regs.contains_key(&filter.id) {
            return Err(EventError::DuplicateSubscription(filter.id));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(
            subscription = %filter.id,
            source = %filter.source,
            event_type = %filter.event_type,
            "subscription registered"
        );
        regs.insert(filter.id.clone(), Registration { filter, tx });
        Ok(rx)
    }

    fn unsubscribe(&self, id: &str) {
        if self.registrations.write().remove(id).is_some() {
            debug!(subscription = %id, "subscription removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(source: &str, ty: &str, id: &str) -> SubscriptionFilter {
        SubscriptionFilter::new(source, ty, None, id)
    }

    #[tokio::test]
    async fn delivers_only_matching_events_in_order() {
        let bus = LocalEventBus::new();
        let mut blocks = bus.subscribe(filter("chain", "newBlock", "a")).unwrap();
        let mut txs = bus.subscribe(filter("chain", "newTx", "b")).unwrap();

        for n in 0..3 {
            bus.publish(&Event::new("chain", "newBlock", json!(n)));
            bus.publish(&Event::new("chain", "newTx", json!(n + 10)));
        }

        for n in 0..3 {
            assert_eq!(blocks.recv().await.unwrap().payload, json!(n));
            assert_eq!(txs.recv().await.unwrap().payload, json!(n + 10));
        }
        assert!(blocks.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_closes_channel_and_is_idempotent() {
        let bus = LocalEventBus::new();
        let mut rx = bus.subscribe(filter("chain", "newBlock", "a")).unwrap();

        bus.unsubscribe("a");
        bus.unsubscribe("a");

        assert!(rx.recv().await.is_none());
        assert_eq!(bus.publish(&Event::new("chain", "newBlock", json!(1))), 0);
    }

    #[test]
    fn duplicate_id_rejected() {
        let bus = LocalEventBus::new();
        let _rx = bus.subscribe(filter("chain", "newBlock", "a")).unwrap();
        let err = bus.subscribe(filter("ipfs", "put", "a")).unwrap_err();
        assert_eq!(err, EventError::DuplicateSubscription("a".into()));
    }

    #[test]
    fn dropped_receiver_is_pruned() {
        let bus = LocalEventBus::new();
        drop(bus.subscribe(filter("chain", "newBlock", "a")).unwrap());
        assert_eq!(bus.publish(&Event::new("chain", "newBlock", json!(1))), 0);
        assert!(!bus.is_subscribed("a"));
    }

    #[tokio::test]
    async fn close_ends_streams_and_rejects_new_subscriptions() {
        let bus = LocalEventBus::new();
        let mut rx = bus.subscribe(filter("chain", "newBlock", "a")).unwrap();
        bus.close();
        assert!(rx.recv().await.is_none());
        assert_eq!(
            bus.subscribe(filter("chain", "newBlock", "b")).unwrap_err(),
            EventError::BusClosed
        );
    }

    #[test]
    fn subscribe_racing_close_never_outlives_the_bus() {
        use std::sync::Arc;
        use tokio::sync::mpsc::error::TryRecvError;

        for _ in 0..50 {
            let bus = Arc::new(LocalEventBus::new());
            let subscribers: Vec<_> = (0..4)
                .map(|t| {
                    let bus = Arc::clone(&bus);
                    std::thread::spawn(move || {
                        (0..25)
                            .filter_map(|n| {
                                let id = format!("{t}-{n}");
                                bus.subscribe(filter("chain", "newBlock", &id)).ok()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            bus.close();
            for handle in subscribers {
                for mut rx in handle.join().expect("subscriber thread") {
                    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Disconnected);
                }
            }
            assert_eq!(bus.subscription_count(), 0);
        }
    }
}
