//! Order status settlement
//!
//! Maps an order's accumulated amounts to its lifecycle status. Pure apart from
//! the price lookup, which is injected through [`MarketCapProvider`].

use super::order::OrderState;
use super::types::{saturating_sub, Address, OrderStatus};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketCapError {
    #[error("No price configured for token {0}")]
    UnknownToken(String),

    #[error("Amount {0} cannot be represented as a float")]
    Overflow(String),
}

/// Converts token amounts to their legal-currency value
pub trait MarketCapProvider: Send + Sync {
    fn legal_currency_value(
        &self,
        token: &Address,
        amount: &BigUint,
    ) -> std::result::Result<f64, MarketCapError>;
}

/// Which event kind is settling the order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    Fill,
    Cancel,
}

/// Thresholds below which a remainder is no longer worth filling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DustPolicy {
    #[serde(default = "default_fill_dust_value")]
    pub fill_dust_value: f64,
    #[serde(default = "default_cancel_dust_value")]
    pub cancel_dust_value: f64,
    #[serde(default)]
    pub unpriced_remainder_is_dust: bool,
}

fn default_fill_dust_value() -> f64 {
    0.01
}

fn default_cancel_dust_value() -> f64 {
    1.0
}

impl Default for DustPolicy {
    fn default() -> Self {
        Self {
            fill_dust_value: default_fill_dust_value(),
            cancel_dust_value: default_cancel_dust_value(),
            unpriced_remainder_is_dust: false,
        }
    }
}

impl DustPolicy {
    pub fn threshold(&self, mode: SettleMode) -> f64 {
        match mode {
            SettleMode::Fill => self.fill_dust_value,
            SettleMode::Cancel => self.cancel_dust_value,
        }
    }
}

/// Unfilled sell-token amount, floored at zero
///
/// Orders limited by amountB convert the remaining buy amount back into
/// sell-token units at the order's own ratio.
pub fn remaining_amount_s(state: &OrderState) -> BigUint {
    let raw = &state.raw;
    if raw.buy_no_more_than_amount_b {
        let used_b = &state.dealt_amount_b + &state.cancelled_amount_b + &state.split_amount_b;
        let remaining_b = saturating_sub(&raw.amount_b, &used_b);
        if raw.amount_b.is_zero() {
            return BigUint::zero();
        }
        remaining_b * &raw.amount_s / &raw.amount_b
    } else {
        let used_s = &state.dealt_amount_s + &state.cancelled_amount_s + &state.split_amount_s;
        saturating_sub(&raw.amount_s, &used_s)
    }
}

/// Compute the status an order settles to after an event was applied
pub fn settle_order_status(
    state: &OrderState,
    mode: SettleMode,
    market_cap: &dyn MarketCapProvider,
    dust: &DustPolicy,
) -> OrderStatus {
    // Revocation outranks any later accounting
    if state.status == OrderStatus::Cutoff {
        return OrderStatus::Cutoff;
    }

    if state.raw.amount_s.is_zero() || state.raw.amount_b.is_zero() {
        return OrderStatus::Unknown;
    }

    if state.is_pristine() {
        return OrderStatus::New;
    }

    let remaining = remaining_amount_s(state);
    let is_dust = if remaining.is_zero() {
        true
    } else {
        match market_cap.legal_currency_value(&state.raw.token_s, &remaining) {
            Ok(value) => value <= dust.threshold(mode),
            Err(e) => {
                debug!(
                    order_hash = %state.hash_hex(),
                    "Remainder {} has no price ({}), dust={}",
                    remaining, e, dust.unpriced_remainder_is_dust
                );
                dust.unpriced_remainder_is_dust
            }
        }
    };

    match (is_dust, mode) {
        (false, _) => OrderStatus::Partial,
        (true, SettleMode::Cancel) => OrderStatus::Cancelled,
        (true, SettleMode::Fill) => OrderStatus::Finished,
    }
}
