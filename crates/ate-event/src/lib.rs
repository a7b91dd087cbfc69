//! Platform event bus contract for ate.
//!
//! Script runtimes never talk to the bus directly. The event bridge in
//! `ate-lua` consumes the [`EventRegistry`] contract defined here:
//!
//! ```text
//! ┌──────────────┐ subscribe(filter) ┌──────────────┐
//! │ EventBridge  │ ────────────────► │ EventRegistry│
//! │ (per runtime)│ ◄──────────────── │  (the bus)   │
//! └──────────────┘   EventReceiver   └──────────────┘
//!        ▲                                  │
//!        │        Event { source, type,     │ publish
//!        └──────── target, payload } ◄──────┘
//! ```
//!
//! The bus delivers only events matching a subscription's
//! `(source, type, target)` filter, in publish order, and signals end of
//! stream by closing the channel (on `unsubscribe` or bus shutdown).
//!
//! [`LocalEventBus`] is an in-process implementation used by the CLI host
//! and by tests.
//!
//! # Example
//!
//! ```
//! use ate_event::{Event, EventRegistry, LocalEventBus, SubscriptionFilter};
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let bus = LocalEventBus::new();
//! let mut rx = bus
//!     .subscribe(SubscriptionFilter::new("chain", "newBlock", None, "sub-1"))
//!     .unwrap();
//!
//! bus.publish(&Event::new("chain", "newBlock", json!({"height": 7})));
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.payload["height"], 7);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod bus;
mod error;
mod event;

pub use bus::{EventReceiver, EventRegistry, LocalEventBus};
pub use error::EventError;
pub use event::{Event, SubscriptionFilter};
