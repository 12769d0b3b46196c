//! Generic subscription loop shared by every downstream consumer.
//!
//! Each worker reads its group's stream strictly sequentially: one event is
//! fully applied and committed before the next read. Read errors back off
//! exponentially, undecodable payloads are committed past, and transient
//! apply failures retry the same event without advancing the cursor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use crate::bus::{EventBus, LogRecord, Subscription};
use crate::config::BackoffConfig;
use crate::constants::events;
use crate::error::{LogError, PipelineError};
use crate::events::PriceEvent;
use crate::shutdown::Shutdown;

/// Side effect a consumer applies for each delivered event.
///
/// Implementations must be idempotent: the same event can arrive more than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &PriceEvent) -> Result<(), PipelineError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub skipped: u64,
    pub poison: u64,
    pub read_retries: u64,
    pub apply_retries: u64,
}

enum Applied {
    Done,
    Skipped,
    Interrupted,
}

pub struct ConsumerWorker {
    bus: EventBus,
    group: String,
    handler: Arc<dyn EventHandler>,
    backoff: BackoffConfig,
}

impl ConsumerWorker {
    pub fn new(
        bus: EventBus,
        group: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            bus,
            group: group.into(),
            handler,
            backoff,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Runs until shutdown. Only a closed subscription ends the loop with an error.
    pub async fn run(self, mut shutdown: Shutdown) -> Result<ConsumerStats, LogError> {
        let name = self.handler.name();
        let mut stats = ConsumerStats::default();
        let mut backoff = Backoff::new(&self.backoff);

        let Some(mut sub) = self.subscribe(&mut shutdown, &mut backoff).await? else {
            return Ok(stats);
        };
        backoff.reset();
        info!(
            "▶️ [{}] consumer started (group: {}, topic: {})",
            name,
            self.group,
            self.bus.topic()
        );

        loop {
            let read = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                r = sub.next() => r,
            };

            let record = match read {
                Ok(record) => {
                    backoff.reset();
                    record
                }
                Err(e) if e.is_transient() => {
                    stats.read_retries += 1;
                    let delay = backoff.next_delay();
                    warn!(
                        event = events::READ_RETRY,
                        group = %self.group,
                        attempt = backoff.attempts(),
                        "⚠️ [{}] read error, retrying in {:?}: {}",
                        name,
                        delay,
                        e
                    );
                    if !sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    error!("❌ [{}] subscription lost: {}", name, e);
                    return Err(e);
                }
            };

            let event = match PriceEvent::decode(&record.payload) {
                Ok(event) => event,
                Err(e) => {
                    stats.poison += 1;
                    warn!(
                        event = events::POISON_MESSAGE,
                        group = %self.group,
                        partition = record.partition,
                        offset = record.offset,
                        "⚠️ [{}] skipping undecodable message: {}",
                        name,
                        e
                    );
                    self.commit(sub.as_mut(), &record).await;
                    continue;
                }
            };

            match self.apply(&event, &mut shutdown, &mut backoff, &mut stats).await {
                Applied::Done => stats.processed += 1,
                Applied::Skipped => stats.skipped += 1,
                // left uncommitted, the next subscription sees it again
                Applied::Interrupted => break,
            }
            self.commit(sub.as_mut(), &record).await;
        }

        info!(
            "⏹️ [{}] consumer stopped (processed: {}, skipped: {}, poison: {})",
            name, stats.processed, stats.skipped, stats.poison
        );
        Ok(stats)
    }

    async fn subscribe(
        &self,
        shutdown: &mut Shutdown,
        backoff: &mut Backoff,
    ) -> Result<Option<Box<dyn Subscription>>, LogError> {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = shutdown.wait() => return Ok(None),
                r = self.bus.subscribe(&self.group) => r,
            };
            match attempt {
                Ok(sub) => return Ok(Some(sub)),
                Err(e) if !e.is_transient() => {
                    error!("❌ [{}] cannot subscribe {}: {}", self.handler.name(), self.group, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        "⚠️ [{}] subscribe failed for {}, retrying in {:?}: {}",
                        self.handler.name(),
                        self.group,
                        delay,
                        e
                    );
                    if !sleep_or_shutdown(delay, shutdown).await {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn apply(
        &self,
        event: &PriceEvent,
        shutdown: &mut Shutdown,
        backoff: &mut Backoff,
        stats: &mut ConsumerStats,
    ) -> Applied {
        let name = self.handler.name();
        loop {
            match self.handler.handle(event).await {
                Ok(()) => {
                    backoff.reset();
                    return Applied::Done;
                }
                Err(e) if e.is_transient() => {
                    stats.apply_retries += 1;
                    let delay = backoff.next_delay();
                    warn!(
                        symbol = %event.symbol,
                        "⚠️ [{}] transient failure, retrying same event in {:?}: {}",
                        name,
                        delay,
                        e
                    );
                    if !sleep_or_shutdown(delay, shutdown).await {
                        return Applied::Interrupted;
                    }
                }
                Err(e) => {
                    warn!(symbol = %event.symbol, "⚠️ [{}] skipping event: {}", name, e);
                    return Applied::Skipped;
                }
            }
        }
    }

    async fn commit(&self, sub: &mut dyn Subscription, record: &LogRecord) {
        match sub.commit(record).await {
            Ok(()) => debug!(
                group = %self.group,
                partition = record.partition,
                offset = record.offset,
                "committed"
            ),
            // not fatal: the record is redelivered and handlers are idempotent
            Err(e) => warn!("⚠️ [{}] commit failed: {}", self.handler.name(), e),
        }
    }
}

/// Sleeps for `delay` unless shutdown comes first. Returns false on shutdown.
pub async fn sleep_or_shutdown(delay: Duration, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.wait() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
