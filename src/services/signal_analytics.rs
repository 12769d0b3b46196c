use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::consumer::EventHandler;
use super::window::{RollingWindow, WindowStore};
use crate::config::SignalConfig;
use crate::constants::events;
use crate::data::models::SignalRecord;
use crate::data::store::Store;
use crate::error::PipelineError;
use crate::events::{PriceEvent, Trend};

/// Moving averages over a symbol's window after one more observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    pub avg_short: Option<Decimal>,
    pub avg_long: Option<Decimal>,
    pub trend: Trend,
}

/// Owns the rolling windows and turns them into short/long averages.
pub struct SignalAggregator {
    windows: Arc<dyn WindowStore>,
    config: SignalConfig,
}

impl SignalAggregator {
    pub fn new(windows: Arc<dyn WindowStore>, config: SignalConfig) -> Self {
        Self { windows, config }
    }

    pub fn snapshot(&self, window: &RollingWindow) -> Snapshot {
        let avg_short = window.average_last(self.config.short_window);
        let avg_long = window.average_last(self.config.long_window);
        Snapshot {
            avg_short,
            avg_long,
            trend: Trend::classify(avg_short, avg_long),
        }
    }

    /// The symbol's window with `event` folded in, or `None` for a redelivery.
    /// Nothing is saved until [`SignalAggregator::commit`].
    pub async fn stage(&self, event: &PriceEvent) -> Result<Option<RollingWindow>, PipelineError> {
        let mut window = self
            .windows
            .load(&event.symbol)
            .await?
            .unwrap_or_else(|| RollingWindow::new(self.config.window_capacity));
        if !window.observe(event.price, event.observed_at) {
            return Ok(None);
        }
        Ok(Some(window))
    }

    pub async fn commit(&self, symbol: &str, window: RollingWindow) -> Result<(), PipelineError> {
        self.windows.save(symbol, window).await?;
        Ok(())
    }
}

/// Appends a BULLISH/BEARISH/NEUTRAL record for every observation.
pub struct SignalAnalyticsConsumer {
    aggregator: SignalAggregator,
    store: Arc<dyn Store>,
}

impl SignalAnalyticsConsumer {
    pub fn new(aggregator: SignalAggregator, store: Arc<dyn Store>) -> Self {
        Self { aggregator, store }
    }
}

#[async_trait]
impl EventHandler for SignalAnalyticsConsumer {
    fn name(&self) -> &'static str {
        "SIGNAL"
    }

    async fn handle(&self, event: &PriceEvent) -> Result<(), PipelineError> {
        let Some(window) = self.aggregator.stage(event).await? else {
            debug!(
                event = events::DUPLICATE_SKIPPED,
                "[SIGNAL] {} @ {} not newer than window, skipped", event.symbol, event.observed_at
            );
            return Ok(());
        };

        let snap = self.aggregator.snapshot(&window);
        let record = SignalRecord {
            symbol: event.symbol.clone(),
            avg_short: snap.avg_short,
            avg_long: snap.avg_long,
            signal: snap.trend,
            generated_at: Utc::now(),
        };
        self.store.append_signal(record).await?;
        // window only advances once the record is durable, so a retry recomputes the same signal
        self.aggregator.commit(&event.symbol, window).await?;

        info!(
            event = events::SIGNAL_GENERATED,
            "📈 [SIGNAL] {}: short={} long={} -> {}",
            event.symbol,
            fmt_avg(snap.avg_short),
            fmt_avg(snap.avg_long),
            snap.trend
        );
        Ok(())
    }
}

fn fmt_avg(avg: Option<Decimal>) -> String {
    avg.map(|a| a.round_dp(2).to_string())
        .unwrap_or_else(|| "n/a".to_string())
}
