use super::event_store::StoreError;
use super::fork::ForkError;
use super::router::RouterError;
use crate::domain::DomainError;
use crate::infrastructure::{ConfigError, DatabaseError};
use eventbus::BusError;
use thiserror::Error;

/// Errors surfaced by the order manager and its handlers
#[derive(Error, Debug)]
pub enum OrderManagerError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Event store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// An event references an order that was never stored
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Unrecoverable; the router is halted when this is returned
    #[error("Fork recovery failed: {0}")]
    ForkRecovery(#[from] ForkError),

    #[error("Order manager was dropped while handling an event")]
    ManagerDropped,
}

pub type Result<T> = std::result::Result<T, OrderManagerError>;
