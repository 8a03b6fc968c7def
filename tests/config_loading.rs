//! Integration test: Configuration utilities
//!
//! Covers config path resolution and loading the shipped sample.

use relay_ordermanager::bin_common::{load_config_from_env, ConfigType};
use relay_ordermanager::ordermanager::infrastructure::OrderManagerConfig;
use std::io::Write;

#[test]
fn test_config_path_resolution() {
    // Env mutation stays in one test; the harness runs tests in parallel
    std::env::remove_var("CONFIG_PATH");
    let config_path = load_config_from_env(ConfigType::OrderManager);
    assert_eq!(config_path.to_str().unwrap(), "config/order_manager.yaml");

    std::env::set_var("CONFIG_PATH", "elsewhere.yaml");
    let config_path = load_config_from_env(ConfigType::OrderManager);
    assert_eq!(config_path.to_str().unwrap(), "elsewhere.yaml");

    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    assert_eq!(load_config_from_env(custom).to_str().unwrap(), "custom/path.yaml");
    std::env::remove_var("CONFIG_PATH");
}

#[test]
fn test_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/order_manager.yaml");
    let yaml = std::fs::read_to_string(path).unwrap();
    let config = OrderManagerConfig::from_yaml_str(&yaml).unwrap();

    assert_eq!(config.market.base_currencies, vec!["WETH".to_string()]);
    assert_eq!(config.market.tokens.len(), 2);
    assert_eq!(config.order_manager.redelivery.max_attempts, 5);
    assert!(config.feed.path.is_none());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "log_level: debug\ndatabase:\n  url: \"sqlite::memory:\"\n  max_connections: 1"
    )
    .unwrap();

    let config = OrderManagerConfig::load(file.path()).unwrap();
    assert_eq!(config.database.max_connections, 1);
    assert_eq!(config.order_manager.cutoff_cache_ttl_secs, 86_400);
}

#[test]
fn test_load_missing_file_fails() {
    assert!(OrderManagerConfig::load("does/not/exist.yaml").is_err());
}
