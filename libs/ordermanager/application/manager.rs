//! Order Manager
//!
//! Keeps the order book's accumulated amounts and statuses in step with chain
//! events. Every inbound topic gets its own sequential subscription; handlers
//! tolerate redelivery through the event store's duplicate detection and the
//! terminal-status guard.

use super::cutoff_cache::{CutoffCache, CutoffKey, CutoffPairKey};
use super::error::{OrderManagerError, Result};
use super::event_store::EventStore;
use super::fork::ForkRecovery;
use super::notify::Notifier;
use super::router::{EventRouter, RouterState};
use crate::domain::{
    settle_order_status, Address, CutoffEvent, CutoffPairEvent, DomainError, DustPolicy, Event, FillRecord,
    ForkEvent, MarketCapProvider, OrderCancelledEvent, OrderFilledEvent, OrderState,
    RingMinedEvent, SettleMode, Side, SubmitRingMethodEvent, TxStatus,
};
use crate::infrastructure::database::{OrderRow, OrderStore};
use crate::infrastructure::TokenRegistry;
use async_trait::async_trait;
use eventbus::{EventBus, HandlerError, MessageHandler, RedeliveryPolicy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Tunables
pub struct OrderManagerOptions {
    pub dust: DustPolicy,
    pub redelivery: Arc<dyn RedeliveryPolicy>,
}

/// Shared services the manager works against
pub struct OrderManagerDeps {
    pub store: Arc<dyn OrderStore>,
    pub bus: Arc<EventBus<Event>>,
    pub market_cap: Arc<dyn MarketCapProvider>,
    pub tokens: Arc<TokenRegistry>,
    pub fork: Arc<dyn ForkRecovery>,
    pub cutoff_cache: Arc<CutoffCache>,
    /// Cleared when fork recovery fails
    pub shutdown_flag: Arc<AtomicBool>,
}

pub struct OrderManager {
    me: Weak<OrderManager>,
    store: Arc<dyn OrderStore>,
    events: EventStore,
    cutoff_cache: Arc<CutoffCache>,
    market_cap: Arc<dyn MarketCapProvider>,
    tokens: Arc<TokenRegistry>,
    fork: Arc<dyn ForkRecovery>,
    notifier: Notifier,
    router: EventRouter,
    dust: DustPolicy,
    shutdown_flag: Arc<AtomicBool>,
}

impl OrderManager {
    pub fn new(options: OrderManagerOptions, deps: OrderManagerDeps) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            events: EventStore::new(Arc::clone(&deps.store)),
            store: deps.store,
            cutoff_cache: deps.cutoff_cache,
            market_cap: deps.market_cap,
            tokens: deps.tokens,
            fork: deps.fork,
            notifier: Notifier::new(Arc::clone(&deps.bus)),
            router: EventRouter::new(deps.bus, options.redelivery),
            dust: options.dust,
            shutdown_flag: deps.shutdown_flag,
        })
    }

    /// Subscribe to every inbound topic
    pub fn start(&self) -> Result<()> {
        let handler = self.handler()?;
        self.router.start(handler)?;
        info!("Order manager started");
        Ok(())
    }

    /// Unsubscribe and wait for in-flight events to finish
    pub async fn stop(&self) -> Result<()> {
        self.router.stop().await?;
        info!("Order manager stopped");
        Ok(())
    }

    pub fn router_state(&self) -> RouterState {
        self.router.state()
    }

    pub fn cutoff_cache(&self) -> &Arc<CutoffCache> {
        &self.cutoff_cache
    }

    fn handler(&self) -> Result<Arc<dyn MessageHandler<Event>>> {
        let me = self.me.upgrade().ok_or(OrderManagerError::ManagerDropped)?;
        let handler: Arc<dyn MessageHandler<Event>> = me;
        Ok(handler)
    }

    async fn dispatch(&self, event: Event) -> Result<()> {
        let kind = event.kind();
        let tx_hash = event.tx_hash();

        let result = match event {
            Event::NewOrder(state) => self.handle_new_order(state).await,
            Event::RingMined(ev) => self.handle_ring_mined(ev).await,
            Event::SubmitRingMethod(ev) => self.handle_submit_ring_method(ev).await,
            Event::OrderFilled(ev) => self.handle_order_filled(ev).await,
            Event::OrderCancelled(ev) => self.handle_order_cancelled(ev).await,
            Event::CutoffAll(ev) => self.handle_cutoff(ev).await,
            Event::CutoffPair(ev) => self.handle_cutoff_pair(ev).await,
            Event::ChainForkDetected(ev) => self.handle_fork(ev).await,
            Event::ExtractorWarning { message } => self.handle_warning(&message).await,
            Event::OrderUpdated(_)
            | Event::FillNotified(_)
            | Event::CutoffNotified(_)
            | Event::CutoffPairNotified(_) => {
                debug!("Ignoring outbound {} notice", kind.as_str());
                Ok(())
            }
        };

        if let Err(e) = &result {
            error!(kind = kind.as_str(), tx_hash = ?tx_hash, "Handler failed: {}", e);
        }
        result
    }

    // ==================== ORDERS ====================

    fn build_order(&self, submitted: OrderState) -> std::result::Result<OrderState, DomainError> {
        let updated_block = submitted.updated_block;
        let mut order = OrderState::from_raw(submitted.raw);
        order.validate_amounts()?;

        order.market = self.tokens.market_for(&order.raw.token_s, &order.raw.token_b)?;
        order.side = self.tokens.side_for(&order.raw.token_s, &order.raw.token_b)?;
        order.price = order.limit_price();
        order.updated_block = updated_block;
        order.status = settle_order_status(&order, SettleMode::Fill, self.market_cap.as_ref(), &self.dust);
        Ok(order)
    }

    pub async fn handle_new_order(&self, submitted: OrderState) -> Result<()> {
        let order_hash = submitted.hash_hex();
        let order = match self.build_order(submitted) {
            Ok(order) => order,
            Err(e) => {
                warn!(order_hash = %order_hash, "Dropping order: {}", e);
                return Ok(());
            }
        };

        if let Err(e) = self.store.add_order(&OrderRow::from_state(&order)).await {
            if e.is_duplicate() {
                debug!(order_hash = %order_hash, "Order already stored");
                return Ok(());
            }
            return Err(e.into());
        }

        info!(order_hash = %order_hash, "New order in {} ({})", order.market, order.side.as_str());
        self.notifier.order_updated(&order);
        Ok(())
    }

    // ==================== RINGS ====================

    pub async fn handle_ring_mined(&self, event: RingMinedEvent) -> Result<()> {
        if event.status != TxStatus::Success {
            debug!(tx_hash = ?event.tx_hash, "Skipping ring mined with status {}", event.status);
            return Ok(());
        }

        match self.events.save_ring_mined(&event).await {
            Ok(outcome) => {
                debug!(tx_hash = ?event.tx_hash, "Ring mined {:?}", outcome);
                Ok(())
            }
            Err(e) if e.is_duplicate() => {
                debug!(tx_hash = ?event.tx_hash, "Ring mined duplicate");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn handle_submit_ring_method(&self, event: SubmitRingMethodEvent) -> Result<()> {
        if !matches!(event.status, TxStatus::Pending | TxStatus::Failed) {
            debug!(tx_hash = ?event.tx_hash, "Skipping submit ring with status {}", event.status);
            return Ok(());
        }

        match self.events.save_submit_ring_method(&event).await {
            Ok(outcome) => {
                debug!(tx_hash = ?event.tx_hash, "Submit ring {:?}", outcome);
                Ok(())
            }
            Err(e) if e.is_duplicate() => {
                debug!(tx_hash = ?event.tx_hash, "Submit ring duplicate");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ==================== FILLS & CANCELS ====================

    pub async fn handle_order_filled(&self, event: OrderFilledEvent) -> Result<()> {
        if event.status != TxStatus::Success {
            debug!(tx_hash = ?event.tx_hash, "Skipping fill with status {}", event.status);
            return Ok(());
        }
        if self.events.fill_exists(&event.tx_hash, event.fill_index).await? {
            debug!(tx_hash = ?event.tx_hash, fill_index = event.fill_index, "Fill already recorded");
            return Ok(());
        }

        let mut row = self
            .store
            .get_order(&event.order_hash)
            .await?
            .ok_or_else(|| OrderManagerError::OrderNotFound(format!("{:#x}", event.order_hash)))?;
        let mut state = row.expand()?;

        let (market, side) = self.classify_fill(&event, &state);
        let terminal = state.status.is_terminal();
        let mut record = FillRecord::from_event(&event, side, market, state.raw.order_type);
        record.applied = !terminal;

        if !terminal {
            state.apply_fill(&event.amounts());
            state.status = settle_order_status(&state, SettleMode::Fill, self.market_cap.as_ref(), &self.dust);
            state.updated_block = event.block_number;
            row.compress(&state);
        }

        // Record and order update commit together; a failure leaves both for redelivery
        let order_update = (!terminal).then_some(&row);
        match self.events.save_fill(&record, order_update).await {
            Ok(_) => {}
            Err(e) if e.is_duplicate() => {
                debug!(tx_hash = ?event.tx_hash, "Fill duplicate");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        if terminal {
            debug!(order_hash = %row.order_hash, "Order is {}, fill not applied", state.status);
            return Ok(());
        }

        debug!(
            order_hash = %row.order_hash,
            "Filled: dealt_s={} dealt_b={} status={}",
            state.dealt_amount_s, state.dealt_amount_b, state.status
        );
        self.notifier.order_filled(record);
        Ok(())
    }

    /// Market and side from the fill's own tokens, falling back to the stored order
    fn classify_fill(&self, event: &OrderFilledEvent, state: &OrderState) -> (String, Side) {
        let market = self
            .tokens
            .market_for(&event.token_s, &event.token_b)
            .unwrap_or_else(|e| {
                debug!(tx_hash = ?event.tx_hash, "Fill market from stored order: {}", e);
                state.market.clone()
            });
        let side = self
            .tokens
            .side_for(&event.token_s, &event.token_b)
            .unwrap_or_else(|e| {
                debug!(tx_hash = ?event.tx_hash, "Fill side from stored order: {}", e);
                state.side
            });
        (market, side)
    }

    pub async fn handle_order_cancelled(&self, event: OrderCancelledEvent) -> Result<()> {
        let mut row = self
            .store
            .get_order(&event.order_hash)
            .await?
            .ok_or_else(|| OrderManagerError::OrderNotFound(format!("{:#x}", event.order_hash)))?;

        match self.events.save_cancel(&event).await {
            Ok(outcome) => debug!(tx_hash = ?event.tx_hash, "Cancel {:?}", outcome),
            Err(e) if e.is_duplicate() => {
                debug!(tx_hash = ?event.tx_hash, "Cancel duplicate");
                return Ok(());
            }
            Err(e) => {
                error!(tx_hash = ?event.tx_hash, "Failed to record cancel: {}", e);
                return Ok(());
            }
        }

        if event.status != TxStatus::Success {
            debug!(tx_hash = ?event.tx_hash, "Cancel recorded with status {}", event.status);
            return Ok(());
        }

        let mut state = row.expand()?;
        state.apply_cancel(&event.amount_cancelled);
        state.status = settle_order_status(&state, SettleMode::Cancel, self.market_cap.as_ref(), &self.dust);
        state.updated_block = event.block_number;
        row.compress(&state);
        self.store.update_order_while_cancel(&row).await?;

        debug!(order_hash = %row.order_hash, "Cancelled {} -> {}", event.amount_cancelled, state.status);
        self.notifier.order_updated(&state);
        Ok(())
    }

    // ==================== CUTOFFS ====================

    /// Revoke the owner's orders when `cutoff` is newer than the cached one
    ///
    /// The record is saved whatever the transaction status. The bulk update runs
    /// before the record and the cache advance, so a failed update leaves
    /// nothing that would turn the redelivery into a duplicate.
    pub async fn handle_cutoff(&self, mut event: CutoffEvent) -> Result<()> {
        let outcome = match self.events.prepare_cutoff(&mut event).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_duplicate() => {
                debug!(tx_hash = ?event.tx_hash, "Cutoff duplicate");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let key = CutoffKey::new(event.protocol, event.owner);
        let revoke = event.status == TxStatus::Success
            && self.is_newer(event.cutoff, self.cutoff_cache.get_cutoff(&key), &event.owner);
        if revoke {
            let affected = self
                .store
                .set_cutoff_orders(&event.order_hashes, event.block_number)
                .await?;
            info!(owner = ?event.owner, "Cutoff {} revoked {} orders", event.cutoff, affected);
        }

        match self.events.persist_cutoff(&event, outcome).await {
            Ok(()) => debug!(tx_hash = ?event.tx_hash, "Cutoff {:?}", outcome),
            Err(e) => error!(tx_hash = ?event.tx_hash, "Failed to record cutoff: {}", e),
        }

        if revoke {
            self.cutoff_cache.try_advance(key, event.cutoff);
            self.notifier.cutoff(&event);
        }
        Ok(())
    }

    pub async fn handle_cutoff_pair(&self, mut event: CutoffPairEvent) -> Result<()> {
        let outcome = match self.events.prepare_cutoff_pair(&mut event).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_duplicate() => {
                debug!(tx_hash = ?event.tx_hash, "Cutoff pair duplicate");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let key = CutoffPairKey::new(event.protocol, event.owner, event.token1, event.token2);
        let revoke = event.status == TxStatus::Success
            && self.is_newer(event.cutoff, self.cutoff_cache.get_cutoff_pair(&key), &event.owner);
        if revoke {
            let affected = self
                .store
                .set_cutoff_orders(&event.order_hashes, event.block_number)
                .await?;
            info!(owner = ?event.owner, "Cutoff pair {} revoked {} orders", event.cutoff, affected);
        }

        match self.events.persist_cutoff_pair(&event, outcome).await {
            Ok(()) => debug!(tx_hash = ?event.tx_hash, "Cutoff pair {:?}", outcome),
            Err(e) => error!(tx_hash = ?event.tx_hash, "Failed to record cutoff pair: {}", e),
        }

        if revoke {
            self.cutoff_cache.try_advance_pair(key, event.cutoff);
            self.notifier.cutoff_pair(&event);
        }
        Ok(())
    }

    fn is_newer(&self, cutoff: u64, current: u64, owner: &Address) -> bool {
        if cutoff > current {
            return true;
        }
        info!(owner = ?owner, "Cutoff {} is not newer than {}, skipping", cutoff, current);
        false
    }

    // ==================== CONTROL ====================

    pub async fn handle_fork(&self, event: ForkEvent) -> Result<()> {
        if let Err(e) = self.router.pause_for_fork().await {
            warn!("Ignoring fork at block {}: {}", event.fork_block, e);
            return Ok(());
        }

        if let Err(e) = self.fork.fork(&event).await {
            error!("Fork recovery failed, halting: {}", e);
            self.router.halt().await;
            self.shutdown_flag.store(false, Ordering::Release);
            return Err(OrderManagerError::ForkRecovery(e));
        }

        // Cached cutoffs may stem from orphaned blocks
        self.cutoff_cache.clear();

        let handler = self.handler()?;
        if let Err(e) = self.router.resume_after_fork(handler) {
            warn!("Not resuming after fork: {}", e);
        }
        Ok(())
    }

    pub async fn handle_warning(&self, message: &str) -> Result<()> {
        warn!("Extractor warning: {}", message);
        if let Err(e) = self.router.pause_for_warning().await {
            warn!("Could not pause for warning: {}", e);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler<Event> for OrderManager {
    async fn handle(&self, message: Event) -> std::result::Result<(), HandlerError> {
        self.dispatch(message).await.map_err(Into::into)
    }
}
