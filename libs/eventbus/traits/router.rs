//! Message Routing
//!
//! ```text
//! publish(M) → route_key(M) → topic subscribers → queue → handler task
//!                                   ↓
//!                   Topic A: sub 1 → queue → handler (sequential)
//!                            sub 2 → queue → handler (sequential)
//!                   Topic B: sub 3 → queue → handler (sequential)
//!                                   ↑
//!                     (parallel across subscriptions)
//! ```
//!
//! # Ordering Guarantees
//!
//! - **Per-Subscription Sequential**: a handler never sees two messages at once,
//!   and sees them in publish order
//! - **Cross-Subscription Parallel**: different subscriptions make progress
//!   independently

use crate::HandlerError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;

/// A message that can be published on the bus
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// enum Topic { Fill, Cancel }
///
/// #[derive(Debug, Clone)]
/// enum ChainEvent { Fill(FillEvent), Cancel(CancelEvent) }
///
/// impl Routable for ChainEvent {
///     type RouteKey = Topic;
///
///     fn route_key(&self) -> Topic {
///         match self {
///             ChainEvent::Fill(_) => Topic::Fill,
///             ChainEvent::Cancel(_) => Topic::Cancel,
///         }
///     }
/// }
/// ```
pub trait Routable: Clone + Send + Sync + Debug + 'static {
    /// The topic type
    type RouteKey: Hash + Eq + Clone + Send + Sync + Debug + 'static;

    /// Topic this message is delivered to
    ///
    /// On the publish path - should be a simple match!
    fn route_key(&self) -> Self::RouteKey;
}

/// Sequential consumer of the messages on one topic
///
/// The bus calls `handle` from a dedicated task per subscription and awaits it
/// before delivering the next message, so implementations need no internal
/// serialization for a single subscription.
#[async_trait]
pub trait MessageHandler<M>: Send + Sync + 'static
where
    M: Routable,
{
    /// Handle one message
    ///
    /// Returning an error hands the message to the subscription's
    /// [`RedeliveryPolicy`](crate::RedeliveryPolicy).
    async fn handle(&self, message: M) -> std::result::Result<(), HandlerError>;
}
