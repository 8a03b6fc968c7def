//! Application Facade
//!
//! Public API for binaries (presentation layer).
//! Wires the store, bus, caches and manager together from configuration.

use super::cutoff_cache::{spawn_cutoff_cache_cleaner, CutoffCache};
use super::feed::{EventFeed, FeedStats};
use super::fork::ForkProcessor;
use super::manager::{OrderManager, OrderManagerDeps, OrderManagerOptions};
use super::router::RouterState;
use crate::domain::{Event, MarketCapProvider};
use crate::infrastructure::config::RedeliveryConfig;
use crate::infrastructure::{
    init_tracing, init_tracing_with_level, Heartbeat, OrderManagerConfig, OrderStore,
    ShutdownManager, SqliteStore, StaticMarketCap, TokenRegistry,
};
use eventbus::{EventBus, ExponentialBackoff, NeverRedeliver, RedeliveryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

fn redelivery_policy(config: &RedeliveryConfig) -> Arc<dyn RedeliveryPolicy> {
    if config.max_attempts == 0 {
        return Arc::new(NeverRedeliver);
    }
    Arc::new(ExponentialBackoff::new(
        Duration::from_millis(config.initial_delay_ms),
        Duration::from_millis(config.max_delay_ms),
        Some(config.max_attempts),
    ))
}

/// Application facade for the order manager process
pub struct OrderManagerApp {
    pub config: OrderManagerConfig,
    pub bus: Arc<EventBus<Event>>,
    pub manager: Arc<OrderManager>,
    pub cutoff_cache: Arc<CutoffCache>,
    pub shutdown: ShutdownManager,
    pub heartbeat: Heartbeat,
}

impl OrderManagerApp {
    /// Open the store and build the manager; nothing is subscribed yet
    pub async fn new(config: OrderManagerConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn OrderStore> = Arc::new(
            SqliteStore::new(&config.database.url, config.database.max_connections).await?,
        );

        let tokens = Arc::new(TokenRegistry::from_config(&config.market)?);
        let market_cap: Arc<dyn MarketCapProvider> =
            Arc::new(StaticMarketCap::from_registry(&tokens));
        info!("Registered {} tokens", tokens.len());

        let bus = Arc::new(EventBus::new());
        let cutoff_cache = Arc::new(CutoffCache::new());

        let shutdown = ShutdownManager::new();
        shutdown.spawn_signal_handler();

        let settings = &config.order_manager;
        let fork = Arc::new(ForkProcessor::new(
            Arc::clone(&store),
            Arc::clone(&market_cap),
            settings.dust.clone(),
        ));

        let manager = OrderManager::new(
            OrderManagerOptions {
                dust: settings.dust.clone(),
                redelivery: redelivery_policy(&settings.redelivery),
            },
            OrderManagerDeps {
                store,
                bus: Arc::clone(&bus),
                market_cap,
                tokens,
                fork,
                cutoff_cache: Arc::clone(&cutoff_cache),
                shutdown_flag: shutdown.flag(),
            },
        );

        let heartbeat = Heartbeat::new(settings.heartbeat_interval_secs);

        Ok(Self {
            config,
            bus,
            manager,
            cutoff_cache,
            shutdown,
            heartbeat,
        })
    }

    /// Check if app is still running
    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    fn spawn_feed(&self) -> JoinHandle<anyhow::Result<FeedStats>> {
        let feed = EventFeed::new(Arc::clone(&self.bus));
        let path = self.config.feed.path.clone();
        let flag = self.shutdown.flag();

        tokio::spawn(async move {
            let stats = match path {
                Some(path) => {
                    info!("Reading events from {}", path);
                    let file = tokio::fs::File::open(&path).await?;
                    feed.run(BufReader::new(file), &flag).await?
                }
                None => {
                    info!("Reading events from stdin");
                    feed.run(BufReader::new(tokio::io::stdin()), &flag).await?
                }
            };
            Ok::<_, anyhow::Error>(stats)
        })
    }

    fn log_status(&self) {
        let metrics = self.bus.metrics();
        info!(
            "Heartbeat #{}: router {}, {} cached cutoffs, bus published={} delivered={} failed={} redelivered={} dropped={}",
            self.heartbeat.beats(),
            self.manager.router_state(),
            self.cutoff_cache.len(),
            metrics.published,
            metrics.delivered,
            metrics.failed,
            metrics.redelivered,
            metrics.dropped
        );
    }

    /// Run until shutdown is requested or the router halts
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.manager.start()?;

        let settings = &self.config.order_manager;
        let cleaner = spawn_cutoff_cache_cleaner(
            Arc::clone(&self.cutoff_cache),
            settings.clean_interval(),
            settings.cache_ttl(),
            self.shutdown.flag(),
        );
        let feed = self.spawn_feed();

        while self.is_running() {
            if self.manager.router_state() == RouterState::Halted {
                error!("Router halted, shutting down");
                break;
            }
            if self.heartbeat.tick() {
                self.log_status();
            }
            self.shutdown.interruptible_sleep(Duration::from_secs(1)).await;
        }

        // Stop intake before waiting on the workers
        self.shutdown.trigger();
        if let Err(e) = self.manager.stop().await {
            warn!("Error stopping order manager: {}", e);
        }
        if let Err(e) = cleaner.await {
            warn!("Cutoff cache cleaner ended abnormally: {}", e);
        }
        if feed.is_finished() {
            match feed.await {
                Ok(Ok(stats)) => info!("Feed stats: {:?}", stats),
                Ok(Err(e)) => warn!("Event feed failed: {}", e),
                Err(e) => warn!("Event feed task ended abnormally: {}", e),
            }
        } else {
            feed.abort();
        }

        if self.manager.router_state() == RouterState::Halted {
            anyhow::bail!("order manager halted after an unrecoverable fork");
        }
        Ok(())
    }
}

/// Initialize tracing for binaries
pub fn init_logging() {
    init_tracing();
}

/// Initialize tracing for binaries with a specific log level
pub fn init_logging_with_level(level: &str) {
    init_tracing_with_level(level);
}
