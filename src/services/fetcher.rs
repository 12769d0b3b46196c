use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::constants::events;
use crate::data::models::WatchedStock;
use crate::data::source::PriceSource;
use crate::data::store::Store;
use crate::events::PriceEvent;
use crate::shutdown::Shutdown;

/// Outcome counters for one polling pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub symbols: usize,
    pub fetch_failures: usize,
    pub below_threshold: usize,
    pub published: usize,
    pub publish_failures: usize,
    pub interrupted: bool,
}

/// Polls watched symbols and publishes a price event for each threshold hit.
pub struct Fetcher {
    store: Arc<dyn Store>,
    source: Arc<dyn PriceSource>,
    bus: EventBus,
    interval: Duration,
}

impl Fetcher {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn PriceSource>,
        bus: EventBus,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            bus,
            interval,
        }
    }

    /// Ticks every `interval` (first tick one interval after start) until shutdown.
    pub async fn run(self, mut shutdown: Shutdown) {
        info!(
            "⏱️ [FETCHER] started (every {:?}, source: {}, log: {})",
            self.interval,
            self.source.name(),
            self.bus.backend()
        );
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }
            let report = self.tick(&mut shutdown).await;
            info!(
                "⏱️ [FETCHER] tick done: symbols={} published={} below={} fetch_failed={} publish_failed={}",
                report.symbols,
                report.published,
                report.below_threshold,
                report.fetch_failures,
                report.publish_failures
            );
            if report.interrupted {
                break;
            }
        }
        info!("⏹️ [FETCHER] stopped");
    }

    /// One polling pass. Failures for one symbol never affect the others.
    pub async fn tick(&self, shutdown: &mut Shutdown) -> TickReport {
        let mut report = TickReport::default();

        let watched = match self.store.watched_stocks().await {
            Ok(w) => w,
            Err(e) => {
                warn!("⚠️ [FETCHER] could not load watched stocks, skipping tick: {}", e);
                return report;
            }
        };
        let observed_at = Utc::now();
        let by_symbol = group_by_symbol(watched);
        report.symbols = by_symbol.len();

        for (symbol, rules) in by_symbol {
            let fetched = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    report.interrupted = true;
                    break;
                }
                r = self.source.fetch(&symbol) => r,
            };

            let price = match fetched {
                Ok(price) => price,
                Err(e) => {
                    report.fetch_failures += 1;
                    warn!(event = events::FETCH_FAILED, "⚠️ [FETCHER] {}: {}", symbol, e);
                    continue;
                }
            };

            if !rules.iter().any(|r| r.is_triggered_by(price)) {
                report.below_threshold += 1;
                continue;
            }

            if self.publish(&symbol, price, observed_at).await {
                report.published += 1;
            } else {
                report.publish_failures += 1;
            }
        }
        report
    }

    async fn publish(&self, symbol: &str, price: rust_decimal::Decimal, observed_at: DateTime<Utc>) -> bool {
        let event = match PriceEvent::new(symbol, price, observed_at) {
            Ok(event) => event,
            Err(e) => {
                warn!("⚠️ [FETCHER] dropping invalid observation: {}", e);
                return false;
            }
        };
        match self.bus.publish(&event).await {
            Ok(delivery) => {
                info!(
                    event = events::PRICE_PUBLISHED,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "✅ [FETCHER] published {} {}",
                    symbol,
                    price
                );
                true
            }
            Err(e) => {
                // not retried; the next tick observes a fresh price
                warn!(event = events::PUBLISH_FAILED, "❌ [FETCHER] publish failed for {}: {}", symbol, e);
                false
            }
        }
    }
}

/// Groups rules by symbol, keeping first-seen symbol order.
fn group_by_symbol(watched: Vec<WatchedStock>) -> Vec<(String, Vec<WatchedStock>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<WatchedStock>)> = Vec::new();
    for stock in watched {
        match index.get(&stock.symbol) {
            Some(&i) => groups[i].1.push(stock),
            None => {
                index.insert(stock.symbol.clone(), groups.len());
                groups.push((stock.symbol.clone(), vec![stock]));
            }
        }
    }
    groups
}
