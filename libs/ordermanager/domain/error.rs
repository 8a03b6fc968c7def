use thiserror::Error;

/// Malformed input: an event or stored row that cannot become domain state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid amount in {field}: {value}")]
    InvalidAmount { field: &'static str, value: String },

    #[error("Invalid hex in {field}: {value}")]
    InvalidHex { field: &'static str, value: String },

    #[error("Invalid value in {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Unknown {kind} status code {code}")]
    UnknownStatus { kind: &'static str, code: i64 },

    #[error("Order {0} has a zero amountS or amountB")]
    ZeroAmount(String),

    #[error("Unknown token {0}")]
    UnknownToken(String),

    #[error("Unsupported market tokenS:{token_s} tokenB:{token_b}")]
    UnsupportedMarket { token_s: String, token_b: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;
