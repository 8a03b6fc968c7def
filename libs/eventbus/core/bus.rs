use crate::core::metrics::{AtomicBusMetrics, BusMetrics};
use crate::core::subscription::{Subscription, SubscriptionId};
use crate::traits::{BusError, MessageHandler, RedeliveryPolicy, Result, Routable};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

struct Subscriber<M> {
    id: SubscriptionId,
    sender: UnboundedSender<M>,
    attached: Arc<AtomicBool>,
}

/// In-process publish/subscribe bus
///
/// Every subscription gets its own unbounded queue. Publishing never blocks:
/// the message is cloned into each queue of its topic and the call returns.
///
/// # Type Parameters
/// - `M`: Message type; its route key selects the topic
pub struct EventBus<M>
where
    M: Routable,
{
    topics: RwLock<HashMap<M::RouteKey, Vec<Subscriber<M>>>>,
    next_id: AtomicU64,
    metrics: Arc<AtomicBusMetrics>,
}

impl<M> EventBus<M>
where
    M: Routable,
{
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            metrics: Arc::new(AtomicBusMetrics::new()),
        }
    }

    /// Publish a message to every subscriber of its topic
    ///
    /// # Returns
    /// Number of subscriber queues the message was placed on
    pub fn publish(&self, message: M) -> usize {
        let route_key = message.route_key();
        self.metrics.record_published();

        let topics = self.topics.read();
        let Some(subscribers) = topics.get(&route_key) else {
            debug!("No subscribers for {:?}, message discarded", route_key);
            return 0;
        };

        let mut queued = 0;
        for subscriber in subscribers {
            match subscriber.sender.send(message.clone()) {
                Ok(()) => queued += 1,
                Err(_) => warn!(
                    "Subscriber {} on {:?} has no receiver",
                    subscriber.id, route_key
                ),
            }
        }
        queued
    }

    /// Attach a raw queue to a topic
    ///
    /// The caller drains the receiver itself. Used by consumers that are not
    /// handlers, e.g. downstream notification readers and tests.
    pub fn subscribe_channel(&self, route_key: M::RouteKey) -> (SubscriptionId, UnboundedReceiver<M>) {
        let (sender, receiver) = unbounded_channel();
        let id = self.attach(route_key, sender, Arc::new(AtomicBool::new(true)));
        (id, receiver)
    }

    /// Attach a handler to a topic
    ///
    /// Spawns the delivery task on the current tokio runtime. Messages are
    /// handed to `handler` one at a time, in publish order.
    pub fn subscribe<H>(
        &self,
        route_key: M::RouteKey,
        handler: Arc<H>,
        redelivery: Arc<dyn RedeliveryPolicy>,
    ) -> Subscription<M::RouteKey>
    where
        H: MessageHandler<M> + ?Sized,
    {
        let (sender, receiver) = unbounded_channel();
        let attached = Arc::new(AtomicBool::new(true));
        let id = self.attach(route_key.clone(), sender, Arc::clone(&attached));

        let handle = tokio::spawn(run_subscription(
            route_key.clone(),
            receiver,
            handler,
            redelivery,
            Arc::clone(&attached),
            Arc::clone(&self.metrics),
        ));

        Subscription {
            id,
            route_key,
            attached,
            handle,
        }
    }

    /// Detach a handler subscription
    ///
    /// Messages already queued are still handled; nothing new is routed to it
    /// and failed deliveries are no longer retried.
    pub fn unsubscribe(&self, subscription: &Subscription<M::RouteKey>) -> bool {
        self.unsubscribe_id(&subscription.route_key, subscription.id).is_ok()
    }

    /// Detach a subscription by topic and id
    pub fn unsubscribe_id(&self, route_key: &M::RouteKey, id: SubscriptionId) -> Result<()> {
        let mut topics = self.topics.write();
        let subscribers = topics
            .get_mut(route_key)
            .ok_or_else(|| BusError::UnknownSubscription {
                id,
                topic: format!("{:?}", route_key),
            })?;

        let position = subscribers
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| BusError::UnknownSubscription {
                id,
                topic: format!("{:?}", route_key),
            })?;

        let removed = subscribers.remove(position);
        removed.attached.store(false, Ordering::Release);
        if subscribers.is_empty() {
            topics.remove(route_key);
        }

        debug!("Unsubscribed {} from {:?}", id, route_key);
        Ok(())
    }

    /// Number of subscriptions currently attached to a topic
    pub fn subscriber_count(&self, route_key: &M::RouteKey) -> usize {
        self.topics.read().get(route_key).map_or(0, Vec::len)
    }

    pub fn metrics(&self) -> BusMetrics {
        self.metrics.snapshot()
    }

    fn attach(
        &self,
        route_key: M::RouteKey,
        sender: UnboundedSender<M>,
        attached: Arc<AtomicBool>,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Subscribed {} to {:?}", id, route_key);
        self.topics
            .write()
            .entry(route_key)
            .or_default()
            .push(Subscriber {
                id,
                sender,
                attached,
            });
        id
    }
}

impl<M> Default for EventBus<M>
where
    M: Routable,
{
    fn default() -> Self {
        Self::new()
    }
}

async fn run_subscription<M, H>(
    route_key: M::RouteKey,
    mut receiver: UnboundedReceiver<M>,
    handler: Arc<H>,
    redelivery: Arc<dyn RedeliveryPolicy>,
    attached: Arc<AtomicBool>,
    metrics: Arc<AtomicBusMetrics>,
) where
    M: Routable,
    H: MessageHandler<M> + ?Sized,
{
    while let Some(message) = receiver.recv().await {
        let mut attempt = 0;

        loop {
            match handler.handle(message.clone()).await {
                Ok(()) => {
                    metrics.record_delivered();
                    break;
                }
                Err(e) => {
                    metrics.record_failed();

                    if !attached.load(Ordering::Acquire) {
                        warn!(
                            "Handler error for {:?} after detach, not redelivering: {}",
                            route_key, e
                        );
                        metrics.record_dropped();
                        break;
                    }

                    match redelivery.next_delay(attempt) {
                        Some(delay) => {
                            warn!(
                                "Handler error for {:?} (attempt {}), redelivering in {:?}: {}",
                                route_key,
                                attempt + 1,
                                delay,
                                e
                            );
                            tokio::time::sleep(delay).await;
                            if !attached.load(Ordering::Acquire) {
                                metrics.record_dropped();
                                break;
                            }
                            attempt += 1;
                            metrics.record_redelivered();
                        }
                        None => {
                            let failure = BusError::DeliveryFailed {
                                attempts: attempt + 1,
                                reason: e.to_string(),
                            };
                            error!("Handler error for {:?}: {}", route_key, failure);
                            metrics.record_dropped();
                            break;
                        }
                    }
                }
            }
        }
    }

    debug!("Queue closed for {:?}, delivery task exiting", route_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{FixedDelay, HandlerError, NeverRedeliver};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum Topic {
        Numbers,
        Words,
    }

    #[derive(Debug, Clone)]
    enum Msg {
        Number(u32),
        Word(&'static str),
    }

    impl Routable for Msg {
        type RouteKey = Topic;

        fn route_key(&self) -> Topic {
            match self {
                Msg::Number(_) => Topic::Numbers,
                Msg::Word(_) => Topic::Words,
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u32>>,
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl MessageHandler<Msg> for Recorder {
        async fn handle(&self, message: Msg) -> std::result::Result<(), HandlerError> {
            {
                let mut left = self.failures_left.lock();
                if *left > 0 {
                    *left -= 1;
                    return Err("transient".into());
                }
            }
            if let Msg::Number(n) = message {
                tokio::time::sleep(Duration::from_millis(1)).await;
                self.seen.lock().push(n);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::<Msg>::new();
        assert_eq!(bus.publish(Msg::Word("nobody")), 0);
        assert_eq!(bus.metrics().published, 1);
    }

    #[tokio::test]
    async fn test_sequential_delivery_in_order() {
        let bus = EventBus::<Msg>::new();
        let recorder = Arc::new(Recorder::default());
        let sub = bus.subscribe(Topic::Numbers, Arc::clone(&recorder), Arc::new(NeverRedeliver));

        for n in 0..20 {
            assert_eq!(bus.publish(Msg::Number(n)), 1);
        }
        bus.publish(Msg::Word("ignored"));

        assert!(bus.unsubscribe(&sub));
        sub.drained().await;

        assert_eq!(*recorder.seen.lock(), (0..20).collect::<Vec<_>>());
        assert_eq!(bus.subscriber_count(&Topic::Numbers), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_routing() {
        let bus = EventBus::<Msg>::new();
        let recorder = Arc::new(Recorder::default());
        let sub = bus.subscribe(Topic::Numbers, Arc::clone(&recorder), Arc::new(NeverRedeliver));

        bus.publish(Msg::Number(1));
        assert!(bus.unsubscribe(&sub));
        assert!(!sub.is_attached());
        assert_eq!(bus.publish(Msg::Number(2)), 0);
        assert!(!bus.unsubscribe(&sub));

        sub.drained().await;
        assert_eq!(*recorder.seen.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_redelivered() {
        let bus = EventBus::<Msg>::new();
        let recorder = Arc::new(Recorder::default());
        *recorder.failures_left.lock() = 2;
        let sub = bus.subscribe(
            Topic::Numbers,
            Arc::clone(&recorder),
            Arc::new(FixedDelay::new(Duration::from_millis(5), Some(3))),
        );

        bus.publish(Msg::Number(7));
        tokio::time::sleep(Duration::from_millis(100)).await;

        bus.unsubscribe(&sub);
        sub.drained().await;

        assert_eq!(*recorder.seen.lock(), vec![7]);
        let metrics = bus.metrics();
        assert_eq!(metrics.failed, 2);
        assert_eq!(metrics.redelivered, 2);
        assert_eq!(metrics.delivered, 1);
    }

    #[tokio::test]
    async fn test_exhausted_redelivery_drops_message() {
        let bus = EventBus::<Msg>::new();
        let recorder = Arc::new(Recorder::default());
        *recorder.failures_left.lock() = 1;
        let sub = bus.subscribe(Topic::Numbers, Arc::clone(&recorder), Arc::new(NeverRedeliver));

        bus.publish(Msg::Number(1));
        bus.publish(Msg::Number(2));

        bus.unsubscribe(&sub);
        sub.drained().await;

        assert_eq!(*recorder.seen.lock(), vec![2]);
        assert_eq!(bus.metrics().dropped, 1);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let bus = EventBus::<Msg>::new();
        let (id, mut rx) = bus.subscribe_channel(Topic::Words);

        bus.publish(Msg::Word("hello"));
        assert!(matches!(rx.recv().await, Some(Msg::Word("hello"))));

        bus.unsubscribe_id(&Topic::Words, id).unwrap();
        assert!(rx.recv().await.is_none());
        assert!(bus.unsubscribe_id(&Topic::Words, id).is_err());
    }
}
