//! Notices published after an order changed

use crate::domain::{CutoffEvent, CutoffPairEvent, Event, FillRecord, OrderState};
use eventbus::EventBus;
use std::sync::Arc;
use tracing::debug;

pub struct Notifier {
    bus: Arc<EventBus<Event>>,
}

impl Notifier {
    pub fn new(bus: Arc<EventBus<Event>>) -> Self {
        Self { bus }
    }

    pub fn order_updated(&self, state: &OrderState) {
        let delivered = self.bus.publish(Event::OrderUpdated(state.clone()));
        debug!(order_hash = %state.hash_hex(), "order updated -> {} subscribers", delivered);
    }

    pub fn order_filled(&self, record: FillRecord) {
        let order_hash = record.order_hash;
        let delivered = self.bus.publish(Event::FillNotified(record));
        debug!(order_hash = ?order_hash, "order filled -> {} subscribers", delivered);
    }

    pub fn cutoff(&self, event: &CutoffEvent) {
        let delivered = self.bus.publish(Event::CutoffNotified(event.clone()));
        debug!(owner = ?event.owner, "cutoff -> {} subscribers", delivered);
    }

    pub fn cutoff_pair(&self, event: &CutoffPairEvent) {
        let delivered = self.bus.publish(Event::CutoffPairNotified(event.clone()));
        debug!(owner = ?event.owner, "cutoff pair -> {} subscribers", delivered);
    }
}
