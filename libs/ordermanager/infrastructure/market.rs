//! Token registry: symbols, decimals and market-pair classification

use crate::domain::error::{DomainError, Result};
use crate::domain::types::{address_hex, parse_address, Address, Side};
use crate::infrastructure::config::MarketConfig;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: Address,
    pub decimals: u32,
    pub price: Option<f64>,
}

/// Known tokens plus the ordered list of quote currencies
///
/// A market is named `TOKEN-BASE`. When both sides of a pair are base
/// currencies, the one listed first is the quote.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<Address, TokenInfo>,
    base_currencies: Vec<Address>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        let mut registry = Self::new();
        for token in &config.tokens {
            registry.register(TokenInfo {
                symbol: token.symbol.to_uppercase(),
                address: parse_address("market.tokens.address", &token.address)?,
                decimals: token.decimals,
                price: token.price,
            });
        }
        for symbol in &config.base_currencies {
            let address = registry
                .by_symbol(symbol)
                .map(|t| t.address)
                .ok_or_else(|| DomainError::UnknownToken(symbol.clone()))?;
            registry.base_currencies.push(address);
        }
        Ok(registry)
    }

    pub fn register(&mut self, token: TokenInfo) {
        self.tokens.insert(token.address, token);
    }

    /// Append a quote currency at the lowest priority
    pub fn add_base_currency(&mut self, address: Address) {
        if !self.base_currencies.contains(&address) {
            self.base_currencies.push(address);
        }
    }

    pub fn get(&self, address: &Address) -> Option<&TokenInfo> {
        self.tokens.get(address)
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens
            .values()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenInfo> {
        self.tokens.values()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn symbol(&self, address: &Address) -> Result<&str> {
        self.tokens
            .get(address)
            .map(|t| t.symbol.as_str())
            .ok_or_else(|| DomainError::UnknownToken(address_hex(address)))
    }

    /// The quote currency of a pair, if either side is one
    fn quote_of(&self, token_s: &Address, token_b: &Address) -> Option<Address> {
        self.base_currencies
            .iter()
            .find(|base| *base == token_s || *base == token_b)
            .copied()
    }

    /// Market name such as `LRC-WETH`
    pub fn market_for(&self, token_s: &Address, token_b: &Address) -> Result<String> {
        let symbol_s = self.symbol(token_s)?;
        let symbol_b = self.symbol(token_b)?;

        let unsupported = || DomainError::UnsupportedMarket {
            token_s: symbol_s.to_string(),
            token_b: symbol_b.to_string(),
        };
        if token_s == token_b {
            return Err(unsupported());
        }

        let quote = self.quote_of(token_s, token_b).ok_or_else(unsupported)?;
        if quote == *token_s {
            Ok(format!("{}-{}", symbol_b, symbol_s))
        } else {
            Ok(format!("{}-{}", symbol_s, symbol_b))
        }
    }

    /// Selling the quote currency buys the market's token
    pub fn side_for(&self, token_s: &Address, token_b: &Address) -> Result<Side> {
        let quote = self
            .quote_of(token_s, token_b)
            .ok_or_else(|| DomainError::UnsupportedMarket {
                token_s: address_hex(token_s),
                token_b: address_hex(token_b),
            })?;
        if quote == *token_s {
            Ok(Side::Buy)
        } else {
            Ok(Side::Sell)
        }
    }
}
