//! Rolls orders back to the state they had at the fork block

use crate::domain::{
    settle_order_status, DustPolicy, ForkEvent, MarketCapProvider, OrderState, OrderStatus,
    SettleMode, H256,
};
use crate::infrastructure::database::{DatabaseError, OrderRow, OrderStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ForkError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Orphaned event references unknown order {0}")]
    MissingOrder(String),
}

/// What a recovery pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForkReport {
    pub fills_rolled_back: usize,
    pub cancels_rolled_back: usize,
    pub cutoffs_reverted: usize,
    pub orders_repaired: usize,
    pub events_marked: u64,
}

/// Recovery step run while intake is paused
#[async_trait]
pub trait ForkRecovery: Send + Sync {
    async fn fork(&self, event: &ForkEvent) -> Result<ForkReport, ForkError>;
}

/// Rebuilds accumulators from the store's event records
pub struct ForkProcessor {
    store: Arc<dyn OrderStore>,
    market_cap: Arc<dyn MarketCapProvider>,
    dust: DustPolicy,
}

struct Repair {
    row: OrderRow,
    state: OrderState,
}

impl ForkProcessor {
    pub fn new(store: Arc<dyn OrderStore>, market_cap: Arc<dyn MarketCapProvider>, dust: DustPolicy) -> Self {
        Self {
            store,
            market_cap,
            dust,
        }
    }

    async fn load<'a>(
        &self,
        repairs: &'a mut BTreeMap<H256, Repair>,
        order_hash: H256,
    ) -> Result<&'a mut Repair, ForkError> {
        if !repairs.contains_key(&order_hash) {
            let row = self
                .store
                .get_order(&order_hash)
                .await?
                .ok_or_else(|| ForkError::MissingOrder(format!("{:#x}", order_hash)))?;
            let state = row.expand()?;
            repairs.insert(order_hash, Repair { row, state });
        }
        repairs
            .get_mut(&order_hash)
            .ok_or_else(|| ForkError::MissingOrder(format!("{:#x}", order_hash)))
    }
}

#[async_trait]
impl ForkRecovery for ForkProcessor {
    async fn fork(&self, event: &ForkEvent) -> Result<ForkReport, ForkError> {
        let fork_block = event.fork_block;
        info!(
            "Fork detected at block {} (fork block {}, hash {:#x})",
            event.detected_block, fork_block, event.fork_hash
        );

        let mut report = ForkReport::default();
        let mut repairs: BTreeMap<H256, Repair> = BTreeMap::new();

        for row in self.store.fills_after_block(fork_block).await? {
            let fill = row.to_record()?;
            let repair = self.load(&mut repairs, fill.order_hash).await?;
            repair.state.rollback_fill(&fill.amounts());
            report.fills_rolled_back += 1;
        }

        for row in self.store.cancels_after_block(fork_block).await? {
            let cancel = row.to_event()?;
            let repair = self.load(&mut repairs, cancel.order_hash).await?;
            repair.state.rollback_cancel(&cancel.amount_cancelled);
            report.cancels_rolled_back += 1;
        }

        for row in self.store.orders_cutoff_after_block(fork_block).await? {
            let state = row.expand()?;
            let hash = state.hash();
            let repair = repairs.entry(hash).or_insert(Repair { row, state });
            // Revocation came from an orphaned block
            repair.state.status = OrderStatus::New;
            report.cutoffs_reverted += 1;
        }

        for (hash, repair) in repairs.iter_mut() {
            let state = &mut repair.state;
            let mode = if state.has_cancellations() {
                SettleMode::Cancel
            } else {
                SettleMode::Fill
            };
            let previous = state.status;
            state.status = settle_order_status(state, mode, self.market_cap.as_ref(), &self.dust);
            state.updated_block = fork_block;
            repair.row.compress(state);
            self.store.save_order(&repair.row).await?;

            debug!(order_hash = ?hash, "Repaired order {} -> {}", previous, state.status);
            report.orders_repaired += 1;
        }

        report.events_marked = self.store.mark_forked_after_block(fork_block).await?;

        if report.orders_repaired == 0 && report.events_marked == 0 {
            warn!("Fork at block {} touched no stored events", fork_block);
        }
        info!(
            "Fork recovery done: {} fills, {} cancels, {} cutoffs reverted, {} orders repaired, {} events marked",
            report.fills_rolled_back,
            report.cancels_rolled_back,
            report.cutoffs_reverted,
            report.orders_repaired,
            report.events_marked
        );
        Ok(report)
    }
}
