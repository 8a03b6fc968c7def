//! Static, config-driven legal-currency prices

use super::market::TokenRegistry;
use crate::domain::types::address_hex;
use crate::domain::{Address, MarketCapError, MarketCapProvider};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Quote {
    decimals: u32,
    price: f64,
}

/// Prices fixed at startup: value = amount / 10^decimals * price
#[derive(Debug, Clone, Default)]
pub struct StaticMarketCap {
    quotes: HashMap<Address, Quote>,
}

impl StaticMarketCap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every registered token that carries a price
    pub fn from_registry(registry: &TokenRegistry) -> Self {
        let mut cap = Self::new();
        for token in registry.tokens() {
            if let Some(price) = token.price {
                cap.set_price(token.address, token.decimals, price);
            }
        }
        cap
    }

    pub fn with_price(mut self, token: Address, decimals: u32, price: f64) -> Self {
        self.set_price(token, decimals, price);
        self
    }

    pub fn set_price(&mut self, token: Address, decimals: u32, price: f64) {
        self.quotes.insert(token, Quote { decimals, price });
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl MarketCapProvider for StaticMarketCap {
    fn legal_currency_value(
        &self,
        token: &Address,
        amount: &BigUint,
    ) -> std::result::Result<f64, MarketCapError> {
        let quote = self
            .quotes
            .get(token)
            .ok_or_else(|| MarketCapError::UnknownToken(address_hex(token)))?;

        let units = amount
            .to_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| MarketCapError::Overflow(amount.to_string()))?;

        Ok(units / 10f64.powi(quote.decimals as i32) * quote.price)
    }
}
