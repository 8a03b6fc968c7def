//! # EventBus Traits
//!
//! - **Routable**: messages that know which topic they belong to
//! - **MessageHandler**: sequential consumer of a topic
//! - **RedeliveryPolicy**: decides whether and when a failed delivery is retried

pub mod error;
pub mod redelivery;
pub mod router;

pub use error::{BusError, HandlerError, Result};
pub use redelivery::{ExponentialBackoff, FixedDelay, NeverRedeliver, RedeliveryPolicy};
pub use router::{MessageHandler, Routable};
