//! Application Layer
//!
//! Event handlers, idempotent event persistence, fork recovery and the
//! subscription lifecycle. Depends on the domain and infrastructure layers.

pub mod cutoff_cache;
pub mod error;
pub mod event_store;
pub mod facade;
pub mod feed;
pub mod fork;
pub mod manager;
pub mod notify;
pub mod router;

// Re-export application facade for binaries
pub use facade::{init_logging, init_logging_with_level, OrderManagerApp};

pub use cutoff_cache::{
    spawn_cutoff_cache_cleaner, CutoffAdvance, CutoffCache, CutoffKey, CutoffPairKey,
};
pub use error::{OrderManagerError, Result};
pub use event_store::{EventStore, SaveOutcome, StoreError};
pub use feed::{EventFeed, FeedStats};
pub use fork::{ForkError, ForkProcessor, ForkRecovery, ForkReport};
pub use manager::{OrderManager, OrderManagerDeps, OrderManagerOptions};
pub use notify::Notifier;
pub use router::{EventRouter, RouterError, RouterState, RouterTransition};
