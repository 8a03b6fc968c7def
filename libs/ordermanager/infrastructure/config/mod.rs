use crate::domain::types::parse_address;
use crate::domain::DustPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Order manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderManagerConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub order_manager: ManagerSettings,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    #[serde(default = "default_clean_interval")]
    pub cutoff_cache_clean_interval_secs: u64,
    #[serde(default = "default_cache_ttl")]
    pub cutoff_cache_ttl_secs: u64,
    /// Seconds between status lines in the binary's main loop
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default)]
    pub dust: DustPolicy,
    #[serde(default)]
    pub redelivery: RedeliveryConfig,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            cutoff_cache_clean_interval_secs: default_clean_interval(),
            cutoff_cache_ttl_secs: default_cache_ttl(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            dust: DustPolicy::default(),
            redelivery: RedeliveryConfig::default(),
        }
    }
}

impl ManagerSettings {
    pub fn clean_interval(&self) -> Duration {
        Duration::from_secs(self.cutoff_cache_clean_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cutoff_cache_ttl_secs)
    }
}

/// Backoff for handler failures; `max_attempts: 0` disables redelivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeliveryConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarketConfig {
    /// Quote currencies by symbol, highest priority first
    #[serde(default)]
    pub base_currencies: Vec<String>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    /// Legal-currency price of one whole token
    #[serde(default)]
    pub price: Option<f64>,
}

/// Source of newline-delimited JSON events; stdin when `path` is unset
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedConfig {
    #[serde(default)]
    pub path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_url() -> String {
    "sqlite://order_manager.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_clean_interval() -> u64 {
    3600
}

fn default_cache_ttl() -> u64 {
    86_400
}

fn default_heartbeat_interval() -> u64 {
    300
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> usize {
    5
}

fn default_decimals() -> u32 {
    18
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl OrderManagerConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        // Load .env file
        dotenv::dotenv().ok();

        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: OrderManagerConfig = serde_yaml::from_str(&yaml_content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse and validate without touching the filesystem or environment
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: OrderManagerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            info!("Overriding database URL from environment variable");
            self.database.url = db_url;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            info!("Overriding log level from environment variable");
            self.log_level = level;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        if self.database.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        let settings = &self.order_manager;
        if settings.cutoff_cache_clean_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "order_manager.cutoff_cache_clean_interval_secs must be greater than 0".to_string(),
            ));
        }

        if settings.cutoff_cache_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "order_manager.cutoff_cache_ttl_secs must be greater than 0".to_string(),
            ));
        }

        let dust = &settings.dust;
        if !is_non_negative(dust.fill_dust_value) || !is_non_negative(dust.cancel_dust_value) {
            return Err(ConfigError::ValidationError(
                "dust values must be non-negative numbers".to_string(),
            ));
        }

        let redelivery = &settings.redelivery;
        if redelivery.initial_delay_ms > redelivery.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "redelivery.initial_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }

        self.market.validate()
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Log level: {}", self.log_level);
        info!("  Database url: {}", self.database.url);
        info!("  Database max connections: {}", self.database.max_connections);
        info!(
            "  Cutoff cache: clean every {}s, ttl {}s",
            self.order_manager.cutoff_cache_clean_interval_secs,
            self.order_manager.cutoff_cache_ttl_secs
        );
        info!(
            "  Dust: fill <= {}, cancel <= {}, unpriced is dust: {}",
            self.order_manager.dust.fill_dust_value,
            self.order_manager.dust.cancel_dust_value,
            self.order_manager.dust.unpriced_remainder_is_dust
        );
        info!(
            "  Redelivery: {}ms..{}ms, {} attempts",
            self.order_manager.redelivery.initial_delay_ms,
            self.order_manager.redelivery.max_delay_ms,
            self.order_manager.redelivery.max_attempts
        );
        info!(
            "  Market: {} tokens, base currencies [{}]",
            self.market.tokens.len(),
            self.market.base_currencies.join(", ")
        );
        info!(
            "  Feed: {}",
            self.feed.path.as_deref().unwrap_or("<stdin>")
        );
    }
}

impl MarketConfig {
    fn validate(&self) -> Result<()> {
        let mut symbols = HashSet::new();
        let mut addresses = HashSet::new();

        for token in &self.tokens {
            if token.symbol.is_empty() {
                return Err(ConfigError::ValidationError(
                    "token symbol must not be empty".to_string(),
                ));
            }
            if !symbols.insert(token.symbol.to_uppercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate token symbol {}",
                    token.symbol
                )));
            }

            let address = parse_address("market.tokens.address", &token.address)
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
            if !addresses.insert(address) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate token address {}",
                    token.address
                )));
            }

            if let Some(price) = token.price {
                if !is_non_negative(price) {
                    return Err(ConfigError::ValidationError(format!(
                        "price of {} must be a non-negative number",
                        token.symbol
                    )));
                }
            }
        }

        for base in &self.base_currencies {
            if !symbols.contains(&base.to_uppercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "base currency {} is not a configured token",
                    base
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
log_level: debug
database:
  url: "sqlite::memory:"
  max_connections: 1
order_manager:
  cutoff_cache_clean_interval_secs: 60
  cutoff_cache_ttl_secs: 600
  dust:
    fill_dust_value: 0.5
market:
  base_currencies: [WETH]
  tokens:
    - symbol: WETH
      address: "0x0000000000000000000000000000000000000001"
      price: 3000.0
    - symbol: LRC
      address: "0x0000000000000000000000000000000000000002"
      decimals: 18
      price: 0.25
"#;

    #[test]
    fn test_parse_sample() {
        let config = OrderManagerConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.database.max_connections, 1);
        assert_eq!(config.order_manager.dust.fill_dust_value, 0.5);
        assert_eq!(config.order_manager.dust.cancel_dust_value, 1.0);
        assert_eq!(config.order_manager.redelivery.max_attempts, 5);
        assert_eq!(config.market.tokens[0].decimals, 18);
        assert!(config.feed.path.is_none());
    }

    #[test]
    fn test_defaults_from_empty_document() {
        let config = OrderManagerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.order_manager.cutoff_cache_clean_interval_secs, 3600);
        assert!(config.market.tokens.is_empty());
    }

    #[test]
    fn test_rejects_unknown_base_currency() {
        let yaml = r#"
market:
  base_currencies: [USDT]
  tokens:
    - symbol: WETH
      address: "0x0000000000000000000000000000000000000001"
"#;
        let err = OrderManagerConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(OrderManagerConfig::from_yaml_str("log_level: loud").is_err());
        assert!(OrderManagerConfig::from_yaml_str("database:\n  max_connections: 0").is_err());
        assert!(OrderManagerConfig::from_yaml_str(
            "order_manager:\n  dust:\n    fill_dust_value: -1.0"
        )
        .is_err());
        assert!(OrderManagerConfig::from_yaml_str(
            "market:\n  tokens:\n    - symbol: X\n      address: nope"
        )
        .is_err());
    }
}
