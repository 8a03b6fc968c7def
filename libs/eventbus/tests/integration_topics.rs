//! Integration tests for topic isolation
//!
//! A slow subscriber must never hold up another subscription, while each
//! subscription still sees its own messages strictly in order.

mod common;

use common::{GateHandler, RecordingHandler, Tick, Topic};
use eventbus::{EventBus, NeverRedeliver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::test]
async fn test_slow_topic_does_not_block_fast_topic() {
    let bus = EventBus::<Tick>::new();
    let gate = Arc::new(Notify::new());
    let slow = Arc::new(GateHandler {
        gate: Arc::clone(&gate),
        seen: Default::default(),
    });
    let fast = Arc::new(RecordingHandler::default());

    let slow_sub = bus.subscribe(Topic::Slow, Arc::clone(&slow), Arc::new(NeverRedeliver));
    let fast_sub = bus.subscribe(Topic::Fast, Arc::clone(&fast), Arc::new(NeverRedeliver));

    bus.publish(Tick { topic: Topic::Slow, seq: 1 });
    for seq in 0..5 {
        bus.publish(Tick { topic: Topic::Fast, seq });
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    verbose_println!("fast handler saw {:?}", fast.seen.lock());

    assert_eq!(*fast.seen.lock(), vec![0, 1, 2, 3, 4]);
    assert!(slow.seen.lock().is_empty());

    gate.notify_one();
    bus.unsubscribe(&slow_sub);
    slow_sub.drained().await;
    assert_eq!(*slow.seen.lock(), vec![1]);

    bus.unsubscribe(&fast_sub);
    fast_sub.drained().await;
}

#[tokio::test]
async fn test_two_subscribers_on_one_topic_both_receive() {
    let bus = EventBus::<Tick>::new();
    let a = Arc::new(RecordingHandler::default());
    let b = Arc::new(RecordingHandler::default());

    let sub_a = bus.subscribe(Topic::Fast, Arc::clone(&a), Arc::new(NeverRedeliver));
    let sub_b = bus.subscribe(Topic::Fast, Arc::clone(&b), Arc::new(NeverRedeliver));
    assert_eq!(bus.subscriber_count(&Topic::Fast), 2);

    assert_eq!(bus.publish(Tick { topic: Topic::Fast, seq: 9 }), 2);

    bus.unsubscribe(&sub_a);
    assert_eq!(bus.subscriber_count(&Topic::Fast), 1);
    assert_eq!(bus.publish(Tick { topic: Topic::Fast, seq: 10 }), 1);

    bus.unsubscribe(&sub_b);
    sub_a.drained().await;
    sub_b.drained().await;

    assert_eq!(*a.seen.lock(), vec![9]);
    assert_eq!(*b.seen.lock(), vec![9, 10]);
}
