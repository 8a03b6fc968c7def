//! Relay Order Manager - Main Library
//!
//! Re-exports the workspace libraries and hosts the helpers shared by the
//! binaries.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//! - **ordermanager**: Order book reconciliation (re-exported from workspace)
//! - **eventbus**: In-process event bus (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use relay_ordermanager::bin_common::{load_config_from_env, ConfigType};
//! use relay_ordermanager::ordermanager::application::OrderManagerApp;
//! ```

// Re-export workspace libraries for convenience
pub use eventbus;
pub use ordermanager;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use runner::{BinaryRunner, RunConfig};
}
