//! Database row models and their conversion to domain values
//!
//! Hashes and addresses are stored as full `0x` hex, amounts as decimal text,
//! statuses as their integer codes, cutoff order lists as a JSON array.

use super::{DatabaseError, Result};
use crate::domain::types::{address_hex, hash_hex, parse_address, parse_amount, parse_hash};
use crate::domain::{
    CutoffEvent, CutoffPairEvent, DomainError, FillRecord, OrderCancelledEvent, OrderState,
    OrderStatus, OrderType, RawOrder, RingMinedEvent, Side, SubmitRingMethodEvent, TxStatus, H256,
};
use num_bigint::BigUint;

fn corrupt(table: &'static str, key: &str, err: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Corrupt {
        table,
        key: key.to_string(),
        reason: err.to_string(),
    }
}

fn to_u64(table: &'static str, key: &str, field: &'static str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| {
        corrupt(
            table,
            key,
            DomainError::InvalidField {
                field,
                value: value.to_string(),
            },
        )
    })
}

pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn amount_text(value: &BigUint) -> String {
    value.to_str_radix(10)
}

/// Database representation of an order
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OrderRow {
    pub order_hash: String,
    pub protocol: String,
    pub owner: String,
    pub token_s: String,
    pub token_b: String,
    pub amount_s: String,
    pub amount_b: String,
    pub buy_no_more_than_amount_b: bool,
    pub order_type: String,
    pub valid_since: i64,
    pub valid_until: i64,
    pub market: String,
    pub side: String,
    pub price: f64,
    pub dealt_amount_s: String,
    pub dealt_amount_b: String,
    pub split_amount_s: String,
    pub split_amount_b: String,
    pub cancelled_amount_s: String,
    pub cancelled_amount_b: String,
    pub status: i64,
    pub updated_block: i64,
}

impl OrderRow {
    const TABLE: &'static str = "orders";

    pub fn from_state(state: &OrderState) -> Self {
        let raw = &state.raw;
        let mut row = Self {
            order_hash: hash_hex(&raw.hash),
            protocol: address_hex(&raw.protocol),
            owner: address_hex(&raw.owner),
            token_s: address_hex(&raw.token_s),
            token_b: address_hex(&raw.token_b),
            amount_s: amount_text(&raw.amount_s),
            amount_b: amount_text(&raw.amount_b),
            buy_no_more_than_amount_b: raw.buy_no_more_than_amount_b,
            order_type: raw.order_type.as_str().to_string(),
            valid_since: to_i64(raw.valid_since),
            valid_until: to_i64(raw.valid_until),
            market: state.market.clone(),
            side: state.side.as_str().to_string(),
            price: state.price,
            dealt_amount_s: String::new(),
            dealt_amount_b: String::new(),
            split_amount_s: String::new(),
            split_amount_b: String::new(),
            cancelled_amount_s: String::new(),
            cancelled_amount_b: String::new(),
            status: 0,
            updated_block: 0,
        };
        row.compress(state);
        row
    }

    /// Write the mutable part of `state` back into this row
    pub fn compress(&mut self, state: &OrderState) {
        self.dealt_amount_s = amount_text(&state.dealt_amount_s);
        self.dealt_amount_b = amount_text(&state.dealt_amount_b);
        self.split_amount_s = amount_text(&state.split_amount_s);
        self.split_amount_b = amount_text(&state.split_amount_b);
        self.cancelled_amount_s = amount_text(&state.cancelled_amount_s);
        self.cancelled_amount_b = amount_text(&state.cancelled_amount_b);
        self.status = state.status.code();
        self.updated_block = to_i64(state.updated_block);
    }

    pub fn expand(&self) -> Result<OrderState> {
        let key = self.order_hash.as_str();
        let bad = |e: DomainError| corrupt(Self::TABLE, key, e);

        let raw = RawOrder {
            hash: parse_hash("order_hash", key).map_err(bad)?,
            protocol: parse_address("protocol", &self.protocol).map_err(bad)?,
            owner: parse_address("owner", &self.owner).map_err(bad)?,
            token_s: parse_address("token_s", &self.token_s).map_err(bad)?,
            token_b: parse_address("token_b", &self.token_b).map_err(bad)?,
            amount_s: parse_amount("amount_s", &self.amount_s).map_err(bad)?,
            amount_b: parse_amount("amount_b", &self.amount_b).map_err(bad)?,
            buy_no_more_than_amount_b: self.buy_no_more_than_amount_b,
            order_type: self.order_type.parse::<OrderType>().map_err(bad)?,
            valid_since: to_u64(Self::TABLE, key, "valid_since", self.valid_since)?,
            valid_until: to_u64(Self::TABLE, key, "valid_until", self.valid_until)?,
        };

        Ok(OrderState {
            raw,
            market: self.market.clone(),
            side: self.side.parse::<Side>().map_err(bad)?,
            price: self.price,
            dealt_amount_s: parse_amount("dealt_amount_s", &self.dealt_amount_s).map_err(bad)?,
            dealt_amount_b: parse_amount("dealt_amount_b", &self.dealt_amount_b).map_err(bad)?,
            split_amount_s: parse_amount("split_amount_s", &self.split_amount_s).map_err(bad)?,
            split_amount_b: parse_amount("split_amount_b", &self.split_amount_b).map_err(bad)?,
            cancelled_amount_s: parse_amount("cancelled_amount_s", &self.cancelled_amount_s)
                .map_err(bad)?,
            cancelled_amount_b: parse_amount("cancelled_amount_b", &self.cancelled_amount_b)
                .map_err(bad)?,
            status: OrderStatus::from_code(self.status).map_err(bad)?,
            updated_block: to_u64(Self::TABLE, key, "updated_block", self.updated_block)?,
        })
    }
}

/// Database representation of a fill, keyed by (tx_hash, fill_index)
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FillEventRow {
    pub tx_hash: String,
    pub fill_index: i64,
    pub ring_hash: String,
    pub order_hash: String,
    pub owner: String,
    pub token_s: String,
    pub token_b: String,
    pub amount_s: String,
    pub amount_b: String,
    pub split_s: String,
    pub split_b: String,
    pub side: String,
    pub market: String,
    pub order_type: String,
    pub block_number: i64,
    pub status: i64,
    pub applied: bool,
    pub fork: bool,
}

impl FillEventRow {
    const TABLE: &'static str = "fill_events";

    pub fn from_record(record: &FillRecord) -> Self {
        Self {
            tx_hash: hash_hex(&record.tx_hash),
            fill_index: to_i64(record.fill_index),
            ring_hash: hash_hex(&record.ring_hash),
            order_hash: hash_hex(&record.order_hash),
            owner: address_hex(&record.owner),
            token_s: address_hex(&record.token_s),
            token_b: address_hex(&record.token_b),
            amount_s: amount_text(&record.amount_s),
            amount_b: amount_text(&record.amount_b),
            split_s: amount_text(&record.split_s),
            split_b: amount_text(&record.split_b),
            side: record.side.as_str().to_string(),
            market: record.market.clone(),
            order_type: record.order_type.as_str().to_string(),
            block_number: to_i64(record.block_number),
            status: record.status.code(),
            applied: record.applied,
            fork: record.fork,
        }
    }

    pub fn to_record(&self) -> Result<FillRecord> {
        let key = format!("{}#{}", self.tx_hash, self.fill_index);
        let bad = |e: DomainError| corrupt(Self::TABLE, &key, e);

        Ok(FillRecord {
            tx_hash: parse_hash("tx_hash", &self.tx_hash).map_err(bad)?,
            fill_index: to_u64(Self::TABLE, &key, "fill_index", self.fill_index)?,
            ring_hash: parse_hash("ring_hash", &self.ring_hash).map_err(bad)?,
            order_hash: parse_hash("order_hash", &self.order_hash).map_err(bad)?,
            owner: parse_address("owner", &self.owner).map_err(bad)?,
            token_s: parse_address("token_s", &self.token_s).map_err(bad)?,
            token_b: parse_address("token_b", &self.token_b).map_err(bad)?,
            amount_s: parse_amount("amount_s", &self.amount_s).map_err(bad)?,
            amount_b: parse_amount("amount_b", &self.amount_b).map_err(bad)?,
            split_s: parse_amount("split_s", &self.split_s).map_err(bad)?,
            split_b: parse_amount("split_b", &self.split_b).map_err(bad)?,
            side: self.side.parse::<Side>().map_err(bad)?,
            market: self.market.clone(),
            order_type: self.order_type.parse::<OrderType>().map_err(bad)?,
            block_number: to_u64(Self::TABLE, &key, "block_number", self.block_number)?,
            status: TxStatus::from_code(self.status).map_err(bad)?,
            applied: self.applied,
            fork: self.fork,
        })
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CancelEventRow {
    pub tx_hash: String,
    pub order_hash: String,
    pub amount_cancelled: String,
    pub block_number: i64,
    pub status: i64,
    pub fork: bool,
}

impl CancelEventRow {
    const TABLE: &'static str = "cancel_events";

    pub fn from_event(event: &OrderCancelledEvent) -> Self {
        Self {
            tx_hash: hash_hex(&event.tx_hash),
            order_hash: hash_hex(&event.order_hash),
            amount_cancelled: amount_text(&event.amount_cancelled),
            block_number: to_i64(event.block_number),
            status: event.status.code(),
            fork: false,
        }
    }

    pub fn to_event(&self) -> Result<OrderCancelledEvent> {
        let bad = |e: DomainError| corrupt(Self::TABLE, &self.tx_hash, e);
        Ok(OrderCancelledEvent {
            tx_hash: parse_hash("tx_hash", &self.tx_hash).map_err(bad)?,
            order_hash: parse_hash("order_hash", &self.order_hash).map_err(bad)?,
            amount_cancelled: parse_amount("amount_cancelled", &self.amount_cancelled)
                .map_err(bad)?,
            block_number: to_u64(Self::TABLE, &self.tx_hash, "block_number", self.block_number)?,
            status: TxStatus::from_code(self.status).map_err(bad)?,
        })
    }

    pub fn tx_status(&self) -> Result<TxStatus> {
        TxStatus::from_code(self.status).map_err(|e| corrupt(Self::TABLE, &self.tx_hash, e))
    }
}

fn encode_hashes(hashes: &[H256]) -> Result<String> {
    let hex: Vec<String> = hashes.iter().map(hash_hex).collect();
    Ok(serde_json::to_string(&hex)?)
}

fn decode_hashes(table: &'static str, key: &str, json: &str) -> Result<Vec<H256>> {
    let hex: Vec<String> = serde_json::from_str(json)?;
    hex.iter()
        .map(|h| parse_hash("order_hashes", h).map_err(|e| corrupt(table, key, e)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CutoffEventRow {
    pub tx_hash: String,
    pub protocol: String,
    pub owner: String,
    pub cutoff: i64,
    pub order_hashes: String,
    pub block_number: i64,
    pub status: i64,
    pub fork: bool,
}

impl CutoffEventRow {
    const TABLE: &'static str = "cutoff_events";

    pub fn from_event(event: &CutoffEvent) -> Result<Self> {
        Ok(Self {
            tx_hash: hash_hex(&event.tx_hash),
            protocol: address_hex(&event.protocol),
            owner: address_hex(&event.owner),
            cutoff: to_i64(event.cutoff),
            order_hashes: encode_hashes(&event.order_hashes)?,
            block_number: to_i64(event.block_number),
            status: event.status.code(),
            fork: false,
        })
    }

    pub fn order_hashes(&self) -> Result<Vec<H256>> {
        decode_hashes(Self::TABLE, &self.tx_hash, &self.order_hashes)
    }

    pub fn tx_status(&self) -> Result<TxStatus> {
        TxStatus::from_code(self.status).map_err(|e| corrupt(Self::TABLE, &self.tx_hash, e))
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CutoffPairEventRow {
    pub tx_hash: String,
    pub protocol: String,
    pub owner: String,
    pub token1: String,
    pub token2: String,
    pub cutoff: i64,
    pub order_hashes: String,
    pub block_number: i64,
    pub status: i64,
    pub fork: bool,
}

impl CutoffPairEventRow {
    const TABLE: &'static str = "cutoff_pair_events";

    pub fn from_event(event: &CutoffPairEvent) -> Result<Self> {
        Ok(Self {
            tx_hash: hash_hex(&event.tx_hash),
            protocol: address_hex(&event.protocol),
            owner: address_hex(&event.owner),
            token1: address_hex(&event.token1),
            token2: address_hex(&event.token2),
            cutoff: to_i64(event.cutoff),
            order_hashes: encode_hashes(&event.order_hashes)?,
            block_number: to_i64(event.block_number),
            status: event.status.code(),
            fork: false,
        })
    }

    pub fn order_hashes(&self) -> Result<Vec<H256>> {
        decode_hashes(Self::TABLE, &self.tx_hash, &self.order_hashes)
    }

    pub fn tx_status(&self) -> Result<TxStatus> {
        TxStatus::from_code(self.status).map_err(|e| corrupt(Self::TABLE, &self.tx_hash, e))
    }
}

/// Ring settlement record, shared by ring-mined and submit-ring events
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RingMinedEventRow {
    pub tx_hash: String,
    pub ring_hash: String,
    pub miner: String,
    pub fee_recipient: String,
    pub ring_index: i64,
    pub block_number: i64,
    pub status: i64,
    pub err: String,
    pub fork: bool,
}

impl RingMinedEventRow {
    const TABLE: &'static str = "ring_mined_events";

    pub fn from_ring_mined(event: &RingMinedEvent) -> Self {
        let mut row = Self::empty(&event.tx_hash);
        row.apply_ring_mined(event);
        row
    }

    pub fn from_submit_ring_method(event: &SubmitRingMethodEvent) -> Self {
        let mut row = Self::empty(&event.tx_hash);
        row.apply_submit_ring_method(event);
        row
    }

    fn empty(tx_hash: &H256) -> Self {
        Self {
            tx_hash: hash_hex(tx_hash),
            ring_hash: hash_hex(&H256::zero()),
            miner: String::new(),
            fee_recipient: String::new(),
            ring_index: 0,
            block_number: 0,
            status: TxStatus::Unknown.code(),
            err: String::new(),
            fork: false,
        }
    }

    pub fn apply_ring_mined(&mut self, event: &RingMinedEvent) {
        self.ring_hash = hash_hex(&event.ring_hash);
        self.miner = address_hex(&event.miner);
        self.fee_recipient = address_hex(&event.fee_recipient);
        self.ring_index = to_i64(event.ring_index);
        self.block_number = to_i64(event.block_number);
        self.status = event.status.code();
        self.err.clear();
        self.fork = false;
    }

    pub fn apply_submit_ring_method(&mut self, event: &SubmitRingMethodEvent) {
        self.miner = address_hex(&event.miner);
        self.block_number = to_i64(event.block_number);
        self.status = event.status.code();
        self.err = event.err.clone().unwrap_or_default();
        self.fork = false;
    }

    pub fn tx_status(&self) -> Result<TxStatus> {
        TxStatus::from_code(self.status).map_err(|e| corrupt(Self::TABLE, &self.tx_hash, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;

    fn state() -> OrderState {
        let mut state = OrderState::from_raw(RawOrder {
            hash: H256::from_low_u64_be(0x77),
            protocol: Address::from_low_u64_be(1),
            owner: Address::from_low_u64_be(2),
            token_s: Address::from_low_u64_be(3),
            token_b: Address::from_low_u64_be(4),
            amount_s: "1000000000000000000000000".parse().unwrap(),
            amount_b: BigUint::from(5u32),
            buy_no_more_than_amount_b: true,
            order_type: OrderType::P2pOrder,
            valid_since: 100,
            valid_until: 200,
        });
        state.dealt_amount_s = BigUint::from(3u32);
        state.status = OrderStatus::Partial;
        state.updated_block = 42;
        state
    }

    #[test]
    fn test_order_row_expand_matches_state() {
        let original = state();
        let row = OrderRow::from_state(&original);
        assert_eq!(row.amount_s, "1000000000000000000000000");
        assert_eq!(row.status, 2);
        assert_eq!(row.expand().unwrap(), original);
    }

    #[test]
    fn test_compress_only_touches_mutable_fields() {
        let mut state = state();
        let mut row = OrderRow::from_state(&state);
        state.cancelled_amount_b = BigUint::from(2u32);
        state.status = OrderStatus::Cancelled;
        state.updated_block = 50;
        row.compress(&state);

        assert_eq!(row.cancelled_amount_b, "2");
        assert_eq!(row.status, OrderStatus::Cancelled.code());
        assert_eq!(row.updated_block, 50);
        assert_eq!(row.amount_b, "5");
    }

    #[test]
    fn test_corrupt_row_reported() {
        let mut row = OrderRow::from_state(&state());
        row.dealt_amount_b = "-1".to_string();
        assert!(matches!(row.expand(), Err(DatabaseError::Corrupt { .. })));
    }

    #[test]
    fn test_submit_then_mined_keeps_one_row() {
        let tx = H256::from_low_u64_be(5);
        let mut row = RingMinedEventRow::from_submit_ring_method(&SubmitRingMethodEvent {
            tx_hash: tx,
            miner: Address::from_low_u64_be(9),
            block_number: 10,
            status: TxStatus::Failed,
            err: Some("out of gas".to_string()),
        });
        assert_eq!(row.err, "out of gas");

        row.apply_ring_mined(&RingMinedEvent {
            tx_hash: tx,
            ring_hash: H256::from_low_u64_be(6),
            miner: Address::from_low_u64_be(9),
            fee_recipient: Address::from_low_u64_be(10),
            ring_index: 3,
            block_number: 11,
            status: TxStatus::Success,
        });
        assert_eq!(row.tx_status().unwrap(), TxStatus::Success);
        assert!(row.err.is_empty());
        assert_eq!(row.ring_index, 3);
    }
}
