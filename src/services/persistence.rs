use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::consumer::EventHandler;
use crate::constants::events;
use crate::data::models::PriceRecord;
use crate::data::store::Store;
use crate::error::PipelineError;
use crate::events::PriceEvent;

impl From<&PriceEvent> for PriceRecord {
    fn from(event: &PriceEvent) -> Self {
        PriceRecord {
            symbol: event.symbol.clone(),
            price: event.price,
            timestamp: event.observed_at,
        }
    }
}

/// Stores every observation as a raw price record.
pub struct PersistenceConsumer {
    store: Arc<dyn Store>,
}

impl PersistenceConsumer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for PersistenceConsumer {
    fn name(&self) -> &'static str {
        "PERSIST"
    }

    async fn handle(&self, event: &PriceEvent) -> Result<(), PipelineError> {
        if self.store.insert_price_record(PriceRecord::from(event)).await? {
            info!("✅ [PERSIST] stored {} -> {}", event.symbol, event.price);
        } else {
            debug!(
                event = events::DUPLICATE_SKIPPED,
                "[PERSIST] {} @ {} already stored", event.symbol, event.observed_at
            );
        }
        Ok(())
    }
}
