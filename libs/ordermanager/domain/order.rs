//! Orders: immutable raw terms plus the mutable accumulators folded from events

use super::error::{DomainError, Result};
use super::types::{decimal, hash_hex, saturating_sub, Address, OrderStatus, OrderType, Side, H256};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

/// Order terms as signed by the owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOrder {
    pub hash: H256,
    pub protocol: Address,
    pub owner: Address,
    pub token_s: Address,
    pub token_b: Address,
    #[serde(with = "decimal")]
    pub amount_s: BigUint,
    #[serde(with = "decimal")]
    pub amount_b: BigUint,
    #[serde(default)]
    pub buy_no_more_than_amount_b: bool,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub valid_since: u64,
    #[serde(default)]
    pub valid_until: u64,
}

/// Amounts carried by one fill
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FillAmounts {
    pub amount_s: BigUint,
    pub amount_b: BigUint,
    pub split_s: BigUint,
    pub split_b: BigUint,
}

/// Working copy of an order while an event is applied to it
///
/// Also the payload of the new-order event: accumulators, market, side and
/// price may be omitted there and are derived when the order is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    pub raw: RawOrder,
    #[serde(default)]
    pub market: String,
    #[serde(default = "default_side")]
    pub side: Side,
    #[serde(default)]
    pub price: f64,
    #[serde(default, with = "decimal")]
    pub dealt_amount_s: BigUint,
    #[serde(default, with = "decimal")]
    pub dealt_amount_b: BigUint,
    #[serde(default, with = "decimal")]
    pub split_amount_s: BigUint,
    #[serde(default, with = "decimal")]
    pub split_amount_b: BigUint,
    #[serde(default, with = "decimal")]
    pub cancelled_amount_s: BigUint,
    #[serde(default, with = "decimal")]
    pub cancelled_amount_b: BigUint,
    #[serde(default = "default_status")]
    pub status: OrderStatus,
    #[serde(default)]
    pub updated_block: u64,
}

fn default_side() -> Side {
    Side::Sell
}

fn default_status() -> OrderStatus {
    OrderStatus::New
}

impl OrderState {
    /// Fresh state for newly submitted terms, nothing dealt or cancelled
    pub fn from_raw(raw: RawOrder) -> Self {
        Self {
            raw,
            market: String::new(),
            side: Side::Sell,
            price: 0.0,
            dealt_amount_s: BigUint::zero(),
            dealt_amount_b: BigUint::zero(),
            split_amount_s: BigUint::zero(),
            split_amount_b: BigUint::zero(),
            cancelled_amount_s: BigUint::zero(),
            cancelled_amount_b: BigUint::zero(),
            status: OrderStatus::New,
            updated_block: 0,
        }
    }

    pub fn hash(&self) -> H256 {
        self.raw.hash
    }

    pub fn hash_hex(&self) -> String {
        hash_hex(&self.raw.hash)
    }

    /// Reject terms no status can be computed for
    pub fn validate_amounts(&self) -> Result<()> {
        if self.raw.amount_s.is_zero() || self.raw.amount_b.is_zero() {
            return Err(DomainError::ZeroAmount(self.hash_hex()));
        }
        Ok(())
    }

    /// Whether no event has touched the accumulators yet
    pub fn is_pristine(&self) -> bool {
        self.dealt_amount_s.is_zero()
            && self.dealt_amount_b.is_zero()
            && self.split_amount_s.is_zero()
            && self.split_amount_b.is_zero()
            && self.cancelled_amount_s.is_zero()
            && self.cancelled_amount_b.is_zero()
    }

    pub fn has_cancellations(&self) -> bool {
        !self.cancelled_amount_s.is_zero() || !self.cancelled_amount_b.is_zero()
    }

    pub fn apply_fill(&mut self, fill: &FillAmounts) {
        self.dealt_amount_s += &fill.amount_s;
        self.dealt_amount_b += &fill.amount_b;
        self.split_amount_s += &fill.split_s;
        self.split_amount_b += &fill.split_b;
    }

    /// Credit a cancelled amount to the side the order is limited by
    pub fn apply_cancel(&mut self, amount: &BigUint) {
        if self.raw.buy_no_more_than_amount_b {
            self.cancelled_amount_b += amount;
        } else {
            self.cancelled_amount_s += amount;
        }
    }

    /// Undo a fill orphaned by a fork
    pub fn rollback_fill(&mut self, fill: &FillAmounts) {
        self.dealt_amount_s = saturating_sub(&self.dealt_amount_s, &fill.amount_s);
        self.dealt_amount_b = saturating_sub(&self.dealt_amount_b, &fill.amount_b);
        self.split_amount_s = saturating_sub(&self.split_amount_s, &fill.split_s);
        self.split_amount_b = saturating_sub(&self.split_amount_b, &fill.split_b);
    }

    /// Undo a cancellation orphaned by a fork
    pub fn rollback_cancel(&mut self, amount: &BigUint) {
        if self.raw.buy_no_more_than_amount_b {
            self.cancelled_amount_b = saturating_sub(&self.cancelled_amount_b, amount);
        } else {
            self.cancelled_amount_s = saturating_sub(&self.cancelled_amount_s, amount);
        }
    }

    /// Limit price quoted in the market's base currency
    ///
    /// Buy orders pay tokenS for tokenB, sell orders receive tokenB for tokenS.
    pub fn limit_price(&self) -> f64 {
        let (numerator, denominator) = match self.side {
            Side::Buy => (&self.raw.amount_s, &self.raw.amount_b),
            Side::Sell => (&self.raw.amount_b, &self.raw.amount_s),
        };
        match (numerator.to_f64(), denominator.to_f64()) {
            (Some(n), Some(d)) if d > 0.0 => n / d,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_raw(amount_s: u64, amount_b: u64) -> RawOrder {
        RawOrder {
            hash: H256::from_low_u64_be(1),
            protocol: Address::from_low_u64_be(100),
            owner: Address::from_low_u64_be(200),
            token_s: Address::from_low_u64_be(300),
            token_b: Address::from_low_u64_be(400),
            amount_s: BigUint::from(amount_s),
            amount_b: BigUint::from(amount_b),
            buy_no_more_than_amount_b: false,
            order_type: OrderType::MarketOrder,
            valid_since: 10,
            valid_until: 0,
        }
    }

    #[test]
    fn test_fill_then_rollback() {
        let mut state = OrderState::from_raw(sample_raw(100, 200));
        let fill = FillAmounts {
            amount_s: BigUint::from(40u32),
            amount_b: BigUint::from(80u32),
            split_s: BigUint::from(1u32),
            split_b: BigUint::zero(),
        };

        state.apply_fill(&fill);
        assert_eq!(state.dealt_amount_s, BigUint::from(40u32));
        assert_eq!(state.dealt_amount_b, BigUint::from(80u32));
        assert!(!state.is_pristine());

        state.rollback_fill(&fill);
        state.rollback_fill(&fill);
        assert!(state.is_pristine());
    }

    #[test]
    fn test_cancel_goes_to_limited_side() {
        let mut sell = OrderState::from_raw(sample_raw(100, 200));
        sell.apply_cancel(&BigUint::from(5u32));
        assert_eq!(sell.cancelled_amount_s, BigUint::from(5u32));
        assert!(sell.cancelled_amount_b.is_zero());

        let mut raw = sample_raw(100, 200);
        raw.buy_no_more_than_amount_b = true;
        let mut buy = OrderState::from_raw(raw);
        buy.apply_cancel(&BigUint::from(5u32));
        assert_eq!(buy.cancelled_amount_b, BigUint::from(5u32));
        assert!(buy.has_cancellations());
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let state = OrderState::from_raw(sample_raw(0, 200));
        assert!(matches!(state.validate_amounts(), Err(DomainError::ZeroAmount(_))));
    }

    #[test]
    fn test_limit_price_by_side() {
        let mut state = OrderState::from_raw(sample_raw(100, 200));
        state.side = Side::Sell;
        assert_eq!(state.limit_price(), 2.0);
        state.side = Side::Buy;
        assert_eq!(state.limit_price(), 0.5);
    }

    #[test]
    fn test_new_order_payload_defaults() {
        let json = r#"{
            "raw": {
                "hash": "0x0000000000000000000000000000000000000000000000000000000000000001",
                "protocol": "0x0000000000000000000000000000000000000064",
                "owner": "0x00000000000000000000000000000000000000c8",
                "token_s": "0x000000000000000000000000000000000000012c",
                "token_b": "0x0000000000000000000000000000000000000190",
                "amount_s": "100",
                "amount_b": "200"
            }
        }"#;
        let state: OrderState = serde_json::from_str(json).unwrap();
        assert_eq!(state.status, OrderStatus::New);
        assert!(state.is_pristine());
        assert_eq!(state.raw.amount_b, BigUint::from(200u32));
    }
}
