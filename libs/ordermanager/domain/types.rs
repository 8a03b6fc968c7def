//! Primitive domain types shared by orders and chain events

use super::error::DomainError;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use ethers::types::{Address, H256};

/// Transaction status reported by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Unknown,
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    pub fn code(self) -> i64 {
        match self {
            TxStatus::Unknown => 0,
            TxStatus::Pending => 1,
            TxStatus::Success => 2,
            TxStatus::Failed => 3,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        match code {
            0 => Ok(TxStatus::Unknown),
            1 => Ok(TxStatus::Pending),
            2 => Ok(TxStatus::Success),
            3 => Ok(TxStatus::Failed),
            _ => Err(DomainError::UnknownStatus {
                kind: "tx",
                code,
            }),
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Unknown => write!(f, "UNKNOWN"),
            TxStatus::Pending => write!(f, "PENDING"),
            TxStatus::Success => write!(f, "SUCCESS"),
            TxStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Unknown,
    /// Accepted, nothing filled or cancelled yet
    New,
    /// Some amount dealt or cancelled, remainder still fillable
    Partial,
    /// Fully filled (remainder is dust)
    Finished,
    /// Cancelled down to dust
    Cancelled,
    /// Revoked by an owner-wide or pairwise cutoff
    Cutoff,
}

impl OrderStatus {
    pub fn code(self) -> i64 {
        match self {
            OrderStatus::Unknown => 0,
            OrderStatus::New => 1,
            OrderStatus::Partial => 2,
            OrderStatus::Finished => 3,
            OrderStatus::Cancelled => 4,
            OrderStatus::Cutoff => 5,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        match code {
            0 => Ok(OrderStatus::Unknown),
            1 => Ok(OrderStatus::New),
            2 => Ok(OrderStatus::Partial),
            3 => Ok(OrderStatus::Finished),
            4 => Ok(OrderStatus::Cancelled),
            5 => Ok(OrderStatus::Cutoff),
            _ => Err(DomainError::UnknownStatus {
                kind: "order",
                code,
            }),
        }
    }

    /// Statuses that no longer accept fills
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Cutoff | OrderStatus::Finished | OrderStatus::Unknown
        )
    }

    /// Statuses a cutoff may still revoke
    pub fn is_open(self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::Partial)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Unknown => write!(f, "UNKNOWN"),
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::Partial => write!(f, "PARTIAL"),
            OrderStatus::Finished => write!(f, "FINISHED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Cutoff => write!(f, "CUTOFF"),
        }
    }
}

/// Side of an order relative to its market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl FromStr for Side {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err(DomainError::InvalidField {
                field: "side",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    MarketOrder,
    P2pOrder,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::MarketOrder => "market_order",
            OrderType::P2pOrder => "p2p_order",
        }
    }
}

impl FromStr for OrderType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market_order" => Ok(OrderType::MarketOrder),
            "p2p_order" => Ok(OrderType::P2pOrder),
            _ => Err(DomainError::InvalidField {
                field: "order_type",
                value: s.to_string(),
            }),
        }
    }
}

// =============================================================================
// Hex / decimal helpers
// =============================================================================

/// Full `0x`-prefixed lowercase hex, the form stored in the database
pub fn hash_hex(hash: &H256) -> String {
    format!("{:#x}", hash)
}

pub fn address_hex(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn parse_hash(field: &'static str, value: &str) -> Result<H256, DomainError> {
    H256::from_str(value).map_err(|_| DomainError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

pub fn parse_address(field: &'static str, value: &str) -> Result<Address, DomainError> {
    Address::from_str(value).map_err(|_| DomainError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

pub fn parse_amount(field: &'static str, value: &str) -> Result<BigUint, DomainError> {
    BigUint::from_str(value).map_err(|_| DomainError::InvalidAmount {
        field,
        value: value.to_string(),
    })
}

/// `a - b`, floored at zero
pub fn saturating_sub(a: &BigUint, b: &BigUint) -> BigUint {
    if a > b {
        a - b
    } else {
        BigUint::default()
    }
}

/// Serde adapter: `BigUint` as a base-10 string
pub mod decimal {
    use num_bigint::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        BigUint::from_str(raw.trim()).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_roundtrip() {
        for status in [
            OrderStatus::Unknown,
            OrderStatus::New,
            OrderStatus::Partial,
            OrderStatus::Finished,
            OrderStatus::Cancelled,
            OrderStatus::Cutoff,
        ] {
            assert_eq!(OrderStatus::from_code(status.code()).unwrap(), status);
        }
        assert!(OrderStatus::from_code(42).is_err());
        assert!(TxStatus::from_code(-1).is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Cutoff.is_terminal());
        assert!(OrderStatus::Finished.is_terminal());
        assert!(OrderStatus::Unknown.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Partial.is_terminal());
        assert!(!OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_hex_is_full_width() {
        let hash = H256::from_low_u64_be(0xabc);
        let hex = hash_hex(&hash);
        assert_eq!(hex.len(), 66);
        assert!(hex.starts_with("0x"));
        assert_eq!(parse_hash("hash", &hex).unwrap(), hash);

        let address = Address::from_low_u64_be(7);
        assert_eq!(address_hex(&address).len(), 42);
        assert!(parse_address("owner", "not-hex").is_err());
    }

    #[test]
    fn test_saturating_sub() {
        let ten = BigUint::from(10u32);
        let three = BigUint::from(3u32);
        assert_eq!(saturating_sub(&ten, &three), BigUint::from(7u32));
        assert_eq!(saturating_sub(&three, &ten), BigUint::default());
    }
}
