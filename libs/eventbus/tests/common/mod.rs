//! Common test utilities for EventBus integration tests

use async_trait::async_trait;
use eventbus::{HandlerError, MessageHandler, Routable};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Slow,
    Fast,
}

#[derive(Debug, Clone)]
pub struct Tick {
    pub topic: Topic,
    pub seq: u32,
}

impl Routable for Tick {
    type RouteKey = Topic;

    fn route_key(&self) -> Topic {
        self.topic.clone()
    }
}

/// Records every sequence number it handles
#[derive(Default)]
pub struct RecordingHandler {
    pub seen: Mutex<Vec<u32>>,
}

#[async_trait]
impl MessageHandler<Tick> for RecordingHandler {
    async fn handle(&self, message: Tick) -> Result<(), HandlerError> {
        self.seen.lock().push(message.seq);
        Ok(())
    }
}

/// Blocks on the first message until released
pub struct GateHandler {
    pub gate: Arc<Notify>,
    pub seen: Mutex<Vec<u32>>,
}

#[async_trait]
impl MessageHandler<Tick> for GateHandler {
    async fn handle(&self, message: Tick) -> Result<(), HandlerError> {
        self.gate.notified().await;
        self.seen.lock().push(message.seq);
        Ok(())
    }
}
