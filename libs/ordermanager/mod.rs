//! Relay Order Manager
//!
//! Keeps an order book consistent with on-chain events: fills, cancellations,
//! owner-wide and pairwise cutoffs, ring submissions and chain forks.
//!
//! ## Layers
//!
//! - **domain**: orders, events and settlement rules (no I/O)
//! - **infrastructure**: SQLite store, token registry, prices, config, logging
//! - **application**: the manager, its router, the event store and fork recovery
//!
//! ## Example
//!
//! ```rust,ignore
//! use ordermanager::application::OrderManagerApp;
//! use ordermanager::infrastructure::OrderManagerConfig;
//!
//! let config = OrderManagerConfig::load("config/order_manager.yaml")?;
//! let mut app = OrderManagerApp::new(config).await?;
//! app.run().await?;
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{OrderManager, OrderManagerApp, OrderManagerError};
pub use domain::{Event, EventKind};
pub use infrastructure::{OrderManagerConfig, OrderStore, SqliteStore};
