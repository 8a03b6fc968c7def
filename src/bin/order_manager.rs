use anyhow::Result;
use relay_ordermanager::bin_common::{
    load_config_from_env, parse_args, BinaryRunner, ConfigType, RunConfig,
};
use relay_ordermanager::ordermanager::application::{init_logging_with_level, OrderManagerApp};
use relay_ordermanager::ordermanager::infrastructure::OrderManagerConfig;

struct OrderManagerBinary {
    app: OrderManagerApp,
    run_config: RunConfig,
}

impl BinaryRunner for OrderManagerBinary {
    async fn run(&mut self) -> Result<()> {
        self.app.run().await
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // An explicit path argument beats CONFIG_PATH
    let config_type = match parse_args().into_iter().next() {
        Some(path) => ConfigType::Custom(path),
        None => ConfigType::OrderManager,
    };
    let config_path = load_config_from_env(config_type);
    let config = OrderManagerConfig::load(&config_path)?;

    // Initialize logging with configured level
    init_logging_with_level(&config.log_level);
    config.log();

    let source = config
        .feed
        .path
        .clone()
        .unwrap_or_else(|| "stdin".to_string());
    let run_config = RunConfig::new("Relay Order Manager")
        .with_heartbeat(config.order_manager.heartbeat_interval_secs)
        .with_source(source);

    let app = OrderManagerApp::new(config).await?;
    let mut binary = OrderManagerBinary { app, run_config };
    binary.execute().await
}
