//! Common test utilities for order manager integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use eventbus::{EventBus, NeverRedeliver};
use num_bigint::BigUint;
use ordermanager::application::{
    CutoffCache, ForkError, ForkProcessor, ForkRecovery, ForkReport, OrderManager,
    OrderManagerDeps, OrderManagerOptions,
};
use ordermanager::domain::{
    Address, DustPolicy, Event, ForkEvent, MarketCapProvider, OrderFilledEvent, OrderState,
    OrderType, RawOrder, TxStatus, H256,
};
use ordermanager::infrastructure::database::{
    CancelEventRow, CutoffEventRow, CutoffPairEventRow, DatabaseError, FillEventRow, OrderRow,
    RingMinedEventRow,
};
use ordermanager::infrastructure::{OrderStore, SqliteStore, StaticMarketCap, TokenInfo, TokenRegistry};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn hash(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

pub fn amount(n: u64) -> BigUint {
    BigUint::from(n)
}

pub const PROTOCOL: u64 = 1;
pub const OWNER: u64 = 2;
pub const LRC: u64 = 10;
pub const WETH: u64 = 11;

/// LRC-WETH market, both tokens worth 1 per raw unit
pub fn registry() -> TokenRegistry {
    let mut registry = TokenRegistry::new();
    for (symbol, n) in [("LRC", LRC), ("WETH", WETH)] {
        registry.register(TokenInfo {
            symbol: symbol.to_string(),
            address: addr(n),
            decimals: 0,
            price: Some(1.0),
        });
    }
    registry.add_base_currency(addr(WETH));
    registry
}

/// Sell `amount_s` LRC for `amount_b` WETH
pub fn order(n: u64, amount_s: u64, amount_b: u64) -> OrderState {
    OrderState::from_raw(RawOrder {
        hash: hash(n),
        protocol: addr(PROTOCOL),
        owner: addr(OWNER),
        token_s: addr(LRC),
        token_b: addr(WETH),
        amount_s: amount(amount_s),
        amount_b: amount(amount_b),
        buy_no_more_than_amount_b: false,
        order_type: OrderType::MarketOrder,
        valid_since: 100,
        valid_until: 0,
    })
}

pub fn fill(tx: u64, order_hash: H256, amount_s: u64, amount_b: u64, block: u64) -> OrderFilledEvent {
    OrderFilledEvent {
        tx_hash: hash(tx),
        fill_index: 0,
        ring_hash: hash(tx + 1000),
        order_hash,
        owner: addr(OWNER),
        token_s: addr(LRC),
        token_b: addr(WETH),
        amount_s: amount(amount_s),
        amount_b: amount(amount_b),
        split_s: amount(0),
        split_b: amount(0),
        block_number: block,
        status: TxStatus::Success,
    }
}

/// Recovery that always fails
pub struct FailingFork;

#[async_trait]
impl ForkRecovery for FailingFork {
    async fn fork(&self, _event: &ForkEvent) -> Result<ForkReport, ForkError> {
        Err(ForkError::MissingOrder("0xdead".to_string()))
    }
}

/// Number of upcoming calls to fail, per write path
#[derive(Default)]
pub struct Faults {
    pub fills: AtomicU32,
    pub cutoffs: AtomicU32,
}

impl Faults {
    fn trip(counter: &AtomicU32, what: &str) -> Result<(), DatabaseError> {
        let tripped = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(DatabaseError::OrderNotFound(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

/// SQLite store that fails selected writes on demand
pub struct FlakyStore {
    inner: Arc<SqliteStore>,
    faults: Arc<Faults>,
}

type DbResult<T> = Result<T, DatabaseError>;

#[async_trait]
impl OrderStore for FlakyStore {
    async fn add_order(&self, order: &OrderRow) -> DbResult<()> {
        self.inner.add_order(order).await
    }
    async fn get_order(&self, order_hash: &H256) -> DbResult<Option<OrderRow>> {
        self.inner.get_order(order_hash).await
    }
    async fn save_order(&self, order: &OrderRow) -> DbResult<()> {
        self.inner.save_order(order).await
    }
    async fn update_order_while_fill(&self, order: &OrderRow) -> DbResult<()> {
        self.inner.update_order_while_fill(order).await
    }
    async fn update_order_while_cancel(&self, order: &OrderRow) -> DbResult<()> {
        self.inner.update_order_while_cancel(order).await
    }
    async fn set_cutoff_orders(&self, order_hashes: &[H256], block_number: u64) -> DbResult<u64> {
        Faults::trip(&self.faults.cutoffs, "cutoff")?;
        self.inner.set_cutoff_orders(order_hashes, block_number).await
    }
    async fn get_cutoff_orders(&self, protocol: &Address, owner: &Address, cutoff: u64) -> DbResult<Vec<H256>> {
        self.inner.get_cutoff_orders(protocol, owner, cutoff).await
    }
    async fn get_cutoff_pair_orders(
        &self,
        protocol: &Address,
        owner: &Address,
        token1: &Address,
        token2: &Address,
        cutoff: u64,
    ) -> DbResult<Vec<H256>> {
        self.inner
            .get_cutoff_pair_orders(protocol, owner, token1, token2, cutoff)
            .await
    }
    async fn find_fill_event(&self, tx_hash: &H256, fill_index: u64) -> DbResult<Option<FillEventRow>> {
        self.inner.find_fill_event(tx_hash, fill_index).await
    }
    async fn add_fill_event(&self, row: &FillEventRow) -> DbResult<()> {
        self.inner.add_fill_event(row).await
    }
    async fn record_fill(&self, row: &FillEventRow, order: Option<&OrderRow>) -> DbResult<()> {
        if let Err(e) = Faults::trip(&self.faults.fills, "fill") {
            // Point the update at a missing order so the fill insert has to roll back
            return match order {
                Some(order) => {
                    let mut missing = order.clone();
                    missing.order_hash = format!("{:#x}", H256::repeat_byte(0xee));
                    self.inner.record_fill(row, Some(&missing)).await
                }
                None => Err(e),
            };
        }
        self.inner.record_fill(row, order).await
    }
    async fn find_ring_mined_event(&self, tx_hash: &H256) -> DbResult<Option<RingMinedEventRow>> {
        self.inner.find_ring_mined_event(tx_hash).await
    }
    async fn add_ring_mined_event(&self, row: &RingMinedEventRow) -> DbResult<()> {
        self.inner.add_ring_mined_event(row).await
    }
    async fn save_ring_mined_event(&self, row: &RingMinedEventRow) -> DbResult<()> {
        self.inner.save_ring_mined_event(row).await
    }
    async fn find_cancel_event(&self, tx_hash: &H256) -> DbResult<Option<CancelEventRow>> {
        self.inner.find_cancel_event(tx_hash).await
    }
    async fn add_cancel_event(&self, row: &CancelEventRow) -> DbResult<()> {
        self.inner.add_cancel_event(row).await
    }
    async fn save_cancel_event(&self, row: &CancelEventRow) -> DbResult<()> {
        self.inner.save_cancel_event(row).await
    }
    async fn find_cutoff_event(&self, tx_hash: &H256) -> DbResult<Option<CutoffEventRow>> {
        self.inner.find_cutoff_event(tx_hash).await
    }
    async fn add_cutoff_event(&self, row: &CutoffEventRow) -> DbResult<()> {
        self.inner.add_cutoff_event(row).await
    }
    async fn save_cutoff_event(&self, row: &CutoffEventRow) -> DbResult<()> {
        self.inner.save_cutoff_event(row).await
    }
    async fn find_cutoff_pair_event(&self, tx_hash: &H256) -> DbResult<Option<CutoffPairEventRow>> {
        self.inner.find_cutoff_pair_event(tx_hash).await
    }
    async fn add_cutoff_pair_event(&self, row: &CutoffPairEventRow) -> DbResult<()> {
        self.inner.add_cutoff_pair_event(row).await
    }
    async fn save_cutoff_pair_event(&self, row: &CutoffPairEventRow) -> DbResult<()> {
        self.inner.save_cutoff_pair_event(row).await
    }
    async fn fills_after_block(&self, block_number: u64) -> DbResult<Vec<FillEventRow>> {
        self.inner.fills_after_block(block_number).await
    }
    async fn cancels_after_block(&self, block_number: u64) -> DbResult<Vec<CancelEventRow>> {
        self.inner.cancels_after_block(block_number).await
    }
    async fn orders_cutoff_after_block(&self, block_number: u64) -> DbResult<Vec<OrderRow>> {
        self.inner.orders_cutoff_after_block(block_number).await
    }
    async fn mark_forked_after_block(&self, block_number: u64) -> DbResult<u64> {
        self.inner.mark_forked_after_block(block_number).await
    }
}

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub faults: Arc<Faults>,
    pub bus: Arc<EventBus<Event>>,
    pub cache: Arc<CutoffCache>,
    pub shutdown_flag: Arc<AtomicBool>,
    pub manager: Arc<OrderManager>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    pub async fn with_fork(fork: Arc<dyn ForkRecovery>) -> Self {
        Self::build(Some(fork)).await
    }

    async fn build(fork: Option<Arc<dyn ForkRecovery>>) -> Self {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let registry = registry();
        let market_cap: Arc<dyn MarketCapProvider> = Arc::new(StaticMarketCap::from_registry(&registry));
        let dust = DustPolicy::default();

        let fork: Arc<dyn ForkRecovery> = match fork {
            Some(fork) => fork,
            None => Arc::new(ForkProcessor::new(
                Arc::clone(&store) as Arc<dyn OrderStore>,
                Arc::clone(&market_cap),
                dust.clone(),
            )),
        };

        let faults = Arc::new(Faults::default());
        let flaky: Arc<dyn OrderStore> = Arc::new(FlakyStore {
            inner: Arc::clone(&store),
            faults: Arc::clone(&faults),
        });

        let bus = Arc::new(EventBus::new());
        let cache = Arc::new(CutoffCache::new());
        let shutdown_flag = Arc::new(AtomicBool::new(true));

        let manager = OrderManager::new(
            OrderManagerOptions {
                dust,
                redelivery: Arc::new(NeverRedeliver),
            },
            OrderManagerDeps {
                store: flaky,
                bus: Arc::clone(&bus),
                market_cap,
                tokens: Arc::new(registry),
                fork,
                cutoff_cache: Arc::clone(&cache),
                shutdown_flag: Arc::clone(&shutdown_flag),
            },
        );

        Self {
            store,
            faults,
            bus,
            cache,
            shutdown_flag,
            manager,
        }
    }

    pub async fn stored(&self, order_hash: H256) -> Option<OrderState> {
        self.store
            .get_order(&order_hash)
            .await
            .unwrap()
            .map(|row| row.expand().unwrap())
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
