//! Event log abstraction: an append-only, partitioned, multi-subscriber log.
//!
//! Every consumer group owns an independent cursor, so each group receives the
//! full stream (broadcast fan-out). Records sharing a key land on the same
//! partition and are delivered to a group in publication order. Delivery is
//! at-least-once: a cursor only moves past a record once it is committed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::EventLogConfig;
use crate::error::{ConfigError, LogError, PipelineError, PublishError};
use crate::events::PriceEvent;

pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use memory::MemoryEventLog;

/// One record read from a subscription.
#[derive(Clone, Debug)]
pub struct LogRecord {
    pub topic: String,
    pub partition: usize,
    pub offset: u64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Broker acknowledgement for a published record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub partition: usize,
    pub offset: u64,
}

#[async_trait]
pub trait EventLog: Send + Sync {
    fn name(&self) -> &'static str;

    /// Appends a record keyed for partitioning. Waits at most `timeout` for the ack.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Delivery, LogError>;

    /// Opens a cursor for `group`, resuming from its last committed position.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>, LogError>;
}

#[async_trait]
pub trait Subscription: Send {
    fn group(&self) -> &str;

    /// Blocks until the next record is available for this group.
    async fn next(&mut self) -> Result<LogRecord, LogError>;

    /// Marks `record` (and everything before it on its partition) as handled.
    async fn commit(&mut self, record: &LogRecord) -> Result<(), LogError>;
}

/// Typed facade over an [`EventLog`] bound to the price topic.
#[derive(Clone)]
pub struct EventBus {
    log: Arc<dyn EventLog>,
    topic: String,
    publish_timeout: Duration,
}

impl EventBus {
    pub fn new(log: Arc<dyn EventLog>, topic: impl Into<String>, publish_timeout: Duration) -> Self {
        Self {
            log,
            topic: topic.into(),
            publish_timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn backend(&self) -> &'static str {
        self.log.name()
    }

    /// Serializes and publishes `event`, keyed by its symbol.
    pub async fn publish(&self, event: &PriceEvent) -> Result<Delivery, PublishError> {
        let payload = event.encode()?;
        let delivery = self
            .log
            .publish(&self.topic, &event.symbol, payload, self.publish_timeout)
            .await?;
        debug!(
            symbol = %event.symbol,
            partition = delivery.partition,
            offset = delivery.offset,
            "record appended"
        );
        Ok(delivery)
    }

    pub async fn subscribe(&self, group: &str) -> Result<Box<dyn Subscription>, LogError> {
        self.log.subscribe(&self.topic, group).await
    }
}

/// Builds the configured log backend.
pub fn connect(config: &EventLogConfig) -> Result<Arc<dyn EventLog>, PipelineError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryEventLog::new(config.partitions))),
        #[cfg(feature = "kafka")]
        "kafka" => Ok(Arc::new(kafka::KafkaEventLog::connect(config)?)),
        other => Err(ConfigError::Invalid {
            field: "event_log.backend",
            value: format!("{} (not compiled in)", other),
        }
        .into()),
    }
}
