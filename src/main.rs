use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use stock_pulse::bus::{self, EventBus};
use stock_pulse::config::{AppConfig, Role, WatchEntry};
use stock_pulse::data::{AlphaVantageSource, MemoryStore};
use stock_pulse::error::PipelineError;
use stock_pulse::pipeline::Pipeline;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // Setup Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting StockPulse...");

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = AppConfig::load(&config_path)?;
    info!(
        "Loaded configuration from {}: roles={:?} backend={} broker={} topic={} interval={}s",
        config_path,
        config.roles,
        config.event_log.backend,
        config.event_log.broker,
        config.event_log.topic,
        config.fetcher.interval_secs
    );

    let log = bus::connect(&config.event_log)?;
    let bus = EventBus::new(
        log,
        config.event_log.topic.clone(),
        Duration::from_millis(config.event_log.publish_timeout_ms),
    );

    let store = MemoryStore::new();
    seed_watchlist(&store, &config.watchlist)?;
    if config.watchlist.is_empty() && config.runs(Role::Fetcher) {
        warn!("⚠️ Watchlist is empty, the fetcher will have nothing to poll");
    }

    let mut pipeline = Pipeline::new(config.clone(), bus, Arc::new(store));
    if config.runs(Role::Fetcher) {
        let source = AlphaVantageSource::new(&config.price_source)?;
        pipeline = pipeline.with_price_source(Arc::new(source));
    }

    let handle = pipeline.spawn()?;
    info!("✅ Running tasks: {:?}", handle.task_names());

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C");
    handle.shutdown().await;
    Ok(())
}

/// One portfolio per user, one watched stock per entry.
fn seed_watchlist(store: &MemoryStore, entries: &[WatchEntry]) -> Result<(), PipelineError> {
    let mut portfolios: HashMap<u64, u64> = HashMap::new();
    for entry in entries {
        let portfolio_id = match portfolios.get(&entry.user_id) {
            Some(id) => *id,
            None => {
                let p = store.add_portfolio(entry.user_id)?;
                portfolios.insert(entry.user_id, p.id);
                p.id
            }
        };
        store.add_watched_stock(portfolio_id, &entry.symbol.to_uppercase(), entry.threshold_price)?;
    }
    info!(
        "📋 Seeded {} watched stock(s) across {} portfolio(s)",
        entries.len(),
        portfolios.len()
    );
    Ok(())
}
