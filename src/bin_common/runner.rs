//! Binary runner utilities
//!
//! Standard banner, run and shutdown sequence for long-running binaries.

use tracing::info;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
    /// Where events are read from, shown in the banner
    pub source: Option<String>,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heartbeat_interval_secs: 300,
            source: None,
        }
    }

    pub fn with_heartbeat(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Trait for binary applications
pub trait BinaryRunner {
    /// Run the application main loop
    async fn run(&mut self) -> anyhow::Result<()>;

    /// Get the run configuration
    fn config(&self) -> &RunConfig;

    /// Print startup banner
    fn print_banner(&self) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("Starting {}", config.name);
        if let Some(source) = &config.source {
            info!("Event source: {}", source);
        }
        info!("Heartbeat interval: {}s", config.heartbeat_interval_secs);
        info!("Press Ctrl+C to stop");
        info!("========================================");
        info!("");
    }

    /// Print shutdown banner
    fn print_shutdown(&self, outcome: &anyhow::Result<()>) {
        let config = self.config();
        info!("");
        info!("========================================");
        match outcome {
            Ok(()) => info!("{} stopped gracefully", config.name),
            Err(e) => info!("{} stopped: {}", config.name, e),
        }
        info!("========================================");
    }

    /// Execute the binary with proper initialization and cleanup
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        let result = self.run().await;
        self.print_shutdown(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new("order-manager")
            .with_heartbeat(120)
            .with_source("stdin");

        assert_eq!(config.name, "order-manager");
        assert_eq!(config.heartbeat_interval_secs, 120);
        assert_eq!(config.source.as_deref(), Some("stdin"));
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::new("default");
        assert_eq!(config.heartbeat_interval_secs, 300);
        assert_eq!(config.source, None);
    }
}
