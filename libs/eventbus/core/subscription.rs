use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Unique identifier for a subscription on a bus
pub type SubscriptionId = u64;

/// Handle to a handler attached to one topic
///
/// Dropping the handle does not detach the handler; call
/// [`EventBus::unsubscribe`](crate::EventBus::unsubscribe) and then
/// [`drained`](Subscription::drained) to wait for queued messages to finish.
#[derive(Debug)]
pub struct Subscription<K>
where
    K: Debug,
{
    pub(crate) id: SubscriptionId,
    pub(crate) route_key: K,
    pub(crate) attached: Arc<AtomicBool>,
    pub(crate) handle: JoinHandle<()>,
}

impl<K> Subscription<K>
where
    K: Debug,
{
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn route_key(&self) -> &K {
        &self.route_key
    }

    /// Whether the bus still routes messages to this subscription
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Whether the delivery task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait until every message queued before detaching has been handled
    ///
    /// Never call this from inside the subscription's own handler: the task
    /// would wait on itself.
    pub async fn drained(self) {
        if let Err(e) = self.handle.await {
            warn!(
                "Subscription {} on {:?} ended abnormally: {}",
                self.id, self.route_key, e
            );
        }
    }
}
