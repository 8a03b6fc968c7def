//! Chain events consumed by the manager and notices it publishes

use super::order::{FillAmounts, OrderState};
use super::types::{decimal, hash_hex, Address, OrderType, Side, TxStatus, H256};
use eventbus::Routable;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingMinedEvent {
    pub tx_hash: H256,
    pub ring_hash: H256,
    pub miner: Address,
    pub fee_recipient: Address,
    #[serde(default)]
    pub ring_index: u64,
    pub block_number: u64,
    pub status: TxStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRingMethodEvent {
    pub tx_hash: H256,
    pub miner: Address,
    pub block_number: u64,
    pub status: TxStatus,
    #[serde(default)]
    pub err: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFilledEvent {
    pub tx_hash: H256,
    #[serde(default)]
    pub fill_index: u64,
    pub ring_hash: H256,
    pub order_hash: H256,
    pub owner: Address,
    pub token_s: Address,
    pub token_b: Address,
    #[serde(with = "decimal")]
    pub amount_s: BigUint,
    #[serde(with = "decimal")]
    pub amount_b: BigUint,
    #[serde(default, with = "decimal")]
    pub split_s: BigUint,
    #[serde(default, with = "decimal")]
    pub split_b: BigUint,
    pub block_number: u64,
    pub status: TxStatus,
}

impl OrderFilledEvent {
    pub fn amounts(&self) -> FillAmounts {
        FillAmounts {
            amount_s: self.amount_s.clone(),
            amount_b: self.amount_b.clone(),
            split_s: self.split_s.clone(),
            split_b: self.split_b.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub tx_hash: H256,
    pub order_hash: H256,
    #[serde(with = "decimal")]
    pub amount_cancelled: BigUint,
    pub block_number: u64,
    pub status: TxStatus,
}

/// Owner-wide revocation of every order valid since at or before `cutoff`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoffEvent {
    pub tx_hash: H256,
    pub protocol: Address,
    pub owner: Address,
    pub cutoff: u64,
    #[serde(default)]
    pub order_hashes: Vec<H256>,
    pub block_number: u64,
    pub status: TxStatus,
}

/// Revocation restricted to one unordered token pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoffPairEvent {
    pub tx_hash: H256,
    pub protocol: Address,
    pub owner: Address,
    pub token1: Address,
    pub token2: Address,
    pub cutoff: u64,
    #[serde(default)]
    pub order_hashes: Vec<H256>,
    pub block_number: u64,
    pub status: TxStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkEvent {
    pub detected_block: u64,
    pub fork_block: u64,
    pub fork_hash: H256,
}

/// Persisted view of one fill, published as the order-filled notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub tx_hash: H256,
    pub fill_index: u64,
    pub ring_hash: H256,
    pub order_hash: H256,
    pub owner: Address,
    pub token_s: Address,
    pub token_b: Address,
    #[serde(with = "decimal")]
    pub amount_s: BigUint,
    #[serde(with = "decimal")]
    pub amount_b: BigUint,
    #[serde(with = "decimal")]
    pub split_s: BigUint,
    #[serde(with = "decimal")]
    pub split_b: BigUint,
    pub side: Side,
    pub market: String,
    pub order_type: OrderType,
    pub block_number: u64,
    pub status: TxStatus,
    /// Whether the amounts were folded into the order
    pub applied: bool,
    #[serde(default)]
    pub fork: bool,
}

impl FillRecord {
    pub fn from_event(event: &OrderFilledEvent, side: Side, market: String, order_type: OrderType) -> Self {
        Self {
            tx_hash: event.tx_hash,
            fill_index: event.fill_index,
            ring_hash: event.ring_hash,
            order_hash: event.order_hash,
            owner: event.owner,
            token_s: event.token_s,
            token_b: event.token_b,
            amount_s: event.amount_s.clone(),
            amount_b: event.amount_b.clone(),
            split_s: event.split_s.clone(),
            split_b: event.split_b.clone(),
            side,
            market,
            order_type,
            block_number: event.block_number,
            status: event.status,
            applied: false,
            fork: false,
        }
    }

    pub fn amounts(&self) -> FillAmounts {
        FillAmounts {
            amount_s: self.amount_s.clone(),
            amount_b: self.amount_b.clone(),
            split_s: self.split_s.clone(),
            split_b: self.split_b.clone(),
        }
    }
}

/// Everything that travels over the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Event {
    NewOrder(OrderState),
    RingMined(RingMinedEvent),
    OrderFilled(OrderFilledEvent),
    OrderCancelled(OrderCancelledEvent),
    CutoffAll(CutoffEvent),
    CutoffPair(CutoffPairEvent),
    ChainForkDetected(ForkEvent),
    ExtractorWarning {
        #[serde(default)]
        message: String,
    },
    SubmitRingMethod(SubmitRingMethodEvent),

    // Notices published by the manager
    OrderUpdated(OrderState),
    FillNotified(FillRecord),
    CutoffNotified(CutoffEvent),
    CutoffPairNotified(CutoffPairEvent),
}

/// Bus topic of an [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewOrder,
    RingMined,
    OrderFilled,
    OrderCancelled,
    CutoffAll,
    CutoffPair,
    ChainForkDetected,
    ExtractorWarning,
    SubmitRingMethod,
    OrderUpdated,
    FillNotified,
    CutoffNotified,
    CutoffPairNotified,
}

impl EventKind {
    /// Topics the manager subscribes to
    pub const INBOUND: [EventKind; 9] = [
        EventKind::NewOrder,
        EventKind::RingMined,
        EventKind::OrderFilled,
        EventKind::OrderCancelled,
        EventKind::CutoffAll,
        EventKind::CutoffPair,
        EventKind::ChainForkDetected,
        EventKind::ExtractorWarning,
        EventKind::SubmitRingMethod,
    ];

    /// Topics whose handlers pause the router themselves
    pub fn is_control(self) -> bool {
        matches!(self, EventKind::ChainForkDetected | EventKind::ExtractorWarning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::NewOrder => "new_order",
            EventKind::RingMined => "ring_mined",
            EventKind::OrderFilled => "order_filled",
            EventKind::OrderCancelled => "order_cancelled",
            EventKind::CutoffAll => "cutoff_all",
            EventKind::CutoffPair => "cutoff_pair",
            EventKind::ChainForkDetected => "chain_fork_detected",
            EventKind::ExtractorWarning => "extractor_warning",
            EventKind::SubmitRingMethod => "submit_ring_method",
            EventKind::OrderUpdated => "order_updated",
            EventKind::FillNotified => "fill_notified",
            EventKind::CutoffNotified => "cutoff_notified",
            EventKind::CutoffPairNotified => "cutoff_pair_notified",
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::NewOrder(_) => EventKind::NewOrder,
            Event::RingMined(_) => EventKind::RingMined,
            Event::OrderFilled(_) => EventKind::OrderFilled,
            Event::OrderCancelled(_) => EventKind::OrderCancelled,
            Event::CutoffAll(_) => EventKind::CutoffAll,
            Event::CutoffPair(_) => EventKind::CutoffPair,
            Event::ChainForkDetected(_) => EventKind::ChainForkDetected,
            Event::ExtractorWarning { .. } => EventKind::ExtractorWarning,
            Event::SubmitRingMethod(_) => EventKind::SubmitRingMethod,
            Event::OrderUpdated(_) => EventKind::OrderUpdated,
            Event::FillNotified(_) => EventKind::FillNotified,
            Event::CutoffNotified(_) => EventKind::CutoffNotified,
            Event::CutoffPairNotified(_) => EventKind::CutoffPairNotified,
        }
    }

    /// Transaction hash for events that carry one, for log context
    pub fn tx_hash(&self) -> Option<String> {
        let hash = match self {
            Event::RingMined(e) => e.tx_hash,
            Event::OrderFilled(e) => e.tx_hash,
            Event::OrderCancelled(e) => e.tx_hash,
            Event::CutoffAll(e) | Event::CutoffNotified(e) => e.tx_hash,
            Event::CutoffPair(e) | Event::CutoffPairNotified(e) => e.tx_hash,
            Event::SubmitRingMethod(e) => e.tx_hash,
            Event::FillNotified(e) => e.tx_hash,
            _ => return None,
        };
        Some(hash_hex(&hash))
    }
}

impl Routable for Event {
    type RouteKey = EventKind;

    fn route_key(&self) -> EventKind {
        self.kind()
    }
}
