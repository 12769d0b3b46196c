use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use super::consumer::EventHandler;
use crate::constants::daily::DEDUP_RETENTION_DAYS;
use crate::constants::events;
use crate::data::models::DailyOutcome;
use crate::data::store::Store;
use crate::error::PipelineError;
use crate::events::PriceEvent;

/// Maintains one min/max/avg/count row per symbol and UTC day.
pub struct DailyAnalyticsConsumer {
    store: Arc<dyn Store>,
    newest_day: Mutex<Option<NaiveDate>>,
}

impl DailyAnalyticsConsumer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            newest_day: Mutex::new(None),
        }
    }

    /// On the first event of a newer day, drops dedup keys older than the
    /// retention. A failed compaction is retried on the next new day.
    async fn roll_day(&self, day: NaiveDate) {
        let advanced = match self.newest_day.lock() {
            Ok(mut newest) if newest.map_or(true, |d| day > d) => {
                *newest = Some(day);
                true
            }
            _ => false,
        };
        if !advanced {
            return;
        }
        let Some(cutoff) = day.checked_sub_days(Days::new(DEDUP_RETENTION_DAYS)) else {
            return;
        };
        match self.store.compact_daily_before(cutoff).await {
            Ok(0) => {}
            Ok(dropped) => info!("🧹 [DAILY] dropped {} dedup keys before {}", dropped, cutoff),
            Err(e) => warn!("⚠️ [DAILY] dedup compaction failed: {}", e),
        }
    }
}

#[async_trait]
impl EventHandler for DailyAnalyticsConsumer {
    fn name(&self) -> &'static str {
        "DAILY"
    }

    async fn handle(&self, event: &PriceEvent) -> Result<(), PipelineError> {
        self.roll_day(event.day()).await;
        match self.store.apply_daily_sample(event).await? {
            DailyOutcome::Created(row) => info!(
                event = events::DAILY_UPDATED,
                "📊 [DAILY] created {} {} at {}",
                row.symbol,
                row.date,
                row.avg_price
            ),
            DailyOutcome::Updated(row) => info!(
                event = events::DAILY_UPDATED,
                "📊 [DAILY] {} {}: price={} min={} max={} avg={} n={}",
                row.symbol,
                row.date,
                event.price,
                row.min_price,
                row.max_price,
                row.avg_price.round_dp(4),
                row.sample_count
            ),
            DailyOutcome::Duplicate => debug!(
                event = events::DUPLICATE_SKIPPED,
                "[DAILY] {} @ {} already applied", event.symbol, event.observed_at
            ),
        }
        Ok(())
    }
}
