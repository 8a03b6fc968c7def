//! Domain Layer
//!
//! Order terms, chain events and the settlement rules that turn accumulated
//! amounts into a status. No I/O; depends on nothing outside this crate except
//! the bus's `Routable` trait.

pub mod error;
pub mod events;
pub mod order;
pub mod settlement;
pub mod types;

pub use error::DomainError;
pub use events::{
    CutoffEvent, CutoffPairEvent, Event, EventKind, FillRecord, ForkEvent, OrderCancelledEvent,
    OrderFilledEvent, RingMinedEvent, SubmitRingMethodEvent,
};
pub use order::{FillAmounts, OrderState, RawOrder};
pub use settlement::{
    remaining_amount_s, settle_order_status, DustPolicy, MarketCapError, MarketCapProvider,
    SettleMode,
};
pub use types::{Address, OrderStatus, OrderType, Side, TxStatus, H256};
