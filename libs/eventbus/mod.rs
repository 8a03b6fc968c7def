//! # EventBus
//!
//! An in-process publish/subscribe bus with per-subscription ordering
//! guarantees and cross-subscription parallelism.
//!
//! ## Features
//!
//! - **Typed topics**: messages expose a route key; subscribers attach to a key
//! - **Sequential per subscription**: every subscription owns one queue and one
//!   task, so deliveries to the same subscriber never overlap
//! - **Parallel across subscriptions**: different subscriptions run concurrently
//! - **Pluggable redelivery**: failed deliveries are retried according to a
//!   [`RedeliveryPolicy`] while the subscription is still attached
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventbus::{EventBus, MessageHandler, NeverRedeliver, Routable};
//!
//! let bus = Arc::new(EventBus::<MyEvent>::new());
//! let sub = bus.subscribe(Topic::Fill, Arc::new(FillHandler), Arc::new(NeverRedeliver));
//!
//! bus.publish(MyEvent::Fill { .. });
//!
//! bus.unsubscribe(&sub);
//! sub.drained().await;
//! ```

pub mod core;
pub mod traits;

pub use traits::*;

pub use crate::core::{
    bus::EventBus,
    metrics::{AtomicBusMetrics, BusMetrics},
    subscription::{Subscription, SubscriptionId},
};
