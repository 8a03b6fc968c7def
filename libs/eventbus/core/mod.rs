pub mod bus;
pub mod metrics;
pub mod subscription;

pub use bus::EventBus;
pub use metrics::{AtomicBusMetrics, BusMetrics};
pub use subscription::{Subscription, SubscriptionId};
