use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::consumer::EventHandler;
use crate::constants::events;
use crate::data::models::Alert;
use crate::data::store::Store;
use crate::error::PipelineError;
use crate::events::{AlertKey, PriceEvent};

/// Turns threshold crossings into alerts, one per (symbol, observedAt, rule).
pub struct AlertConsumer {
    store: Arc<dyn Store>,
}

impl AlertConsumer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for AlertConsumer {
    fn name(&self) -> &'static str {
        "ALERT"
    }

    async fn handle(&self, event: &PriceEvent) -> Result<(), PipelineError> {
        let rules = self.store.watched_stocks_for(&event.symbol).await?;

        for rule in rules.iter().filter(|r| r.is_triggered_by(event.price)) {
            let Some(portfolio) = self.store.portfolio(rule.portfolio_id).await? else {
                let miss = PipelineError::PortfolioMissing {
                    portfolio_id: rule.portfolio_id,
                    symbol: rule.symbol.clone(),
                };
                warn!("⚠️ [ALERT] {}; rule {} skipped", miss, rule.id);
                continue;
            };

            let alert = Alert {
                key: AlertKey::derive(event, rule.id),
                user_id: portfolio.user_id,
                symbol: event.symbol.clone(),
                price: event.price,
                timestamp: event.observed_at,
            };

            if self.store.insert_alert(alert).await? {
                info!(
                    event = events::ALERT_CREATED,
                    user_id = portfolio.user_id,
                    rule = rule.id,
                    "🚨 [ALERT] {} at {} (threshold {})",
                    event.symbol,
                    event.price,
                    rule.threshold_price
                );
            } else {
                debug!(
                    event = events::DUPLICATE_SKIPPED,
                    rule = rule.id,
                    "[ALERT] {} @ {} already alerted",
                    event.symbol,
                    event.observed_at
                );
            }
        }
        Ok(())
    }
}
