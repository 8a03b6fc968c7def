//! Infrastructure Layer
//!
//! Contains implementations of external interfaces (database, prices, token
//! metadata) and process plumbing (config, logging, shutdown).
//! This layer depends on the domain layer but not on the application layer.

pub mod config;
pub mod database;
pub mod heartbeat;
pub mod logging;
pub mod market;
pub mod marketcap;
pub mod shutdown;

// Re-export database types
pub use database::{DatabaseError, OrderStore, SqliteStore};

// Re-export config types
pub use config::{ConfigError, OrderManagerConfig};

// Re-export infrastructure services
pub use heartbeat::Heartbeat;
pub use logging::{init_tracing, init_tracing_with_level};
pub use market::{TokenInfo, TokenRegistry};
pub use marketcap::StaticMarketCap;
pub use shutdown::ShutdownManager;
