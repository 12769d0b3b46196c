//! Kafka-backed event log (enabled with the `kafka` feature).

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::info;

use super::{Delivery, EventLog, LogRecord, Subscription};
use crate::config::EventLogConfig;
use crate::error::LogError;

pub struct KafkaEventLog {
    settings: EventLogConfig,
    producer: FutureProducer,
}

impl KafkaEventLog {
    pub fn connect(settings: &EventLogConfig) -> Result<Self, LogError> {
        let producer: FutureProducer = client_config(settings)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| LogError::Unavailable(e.to_string()))?;
        info!("📡 [LOG] kafka producer ready (brokers: {})", settings.broker);
        Ok(Self {
            settings: settings.clone(),
            producer,
        })
    }
}

fn client_config(settings: &EventLogConfig) -> ClientConfig {
    let mut cfg = ClientConfig::new();
    cfg.set("bootstrap.servers", &settings.broker);
    if let Some(v) = &settings.security_protocol {
        cfg.set("security.protocol", v);
    }
    if let Some(v) = &settings.sasl_mechanism {
        cfg.set("sasl.mechanisms", v);
    }
    if let Some(v) = &settings.sasl_username {
        cfg.set("sasl.username", v);
    }
    if let Some(v) = &settings.sasl_password {
        cfg.set("sasl.password", v);
    }
    cfg
}

#[async_trait]
impl EventLog for KafkaEventLog {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Delivery, LogError> {
        let record = FutureRecord::to(topic).key(key).payload(&payload);
        match self.producer.send(record, timeout).await {
            Ok((partition, offset)) => Ok(Delivery {
                partition: partition.max(0) as usize,
                offset: offset.max(0) as u64,
            }),
            Err((e, _msg)) => Err(LogError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>, LogError> {
        let consumer: StreamConsumer = client_config(&self.settings)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "45000")
            .create()
            .map_err(|e| LogError::Unavailable(e.to_string()))?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| LogError::Unavailable(e.to_string()))?;
        info!("📡 [LOG] kafka group {} subscribed to {}", group, topic);
        Ok(Box::new(KafkaSubscription {
            consumer,
            group: group.to_string(),
        }))
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
    group: String,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    fn group(&self) -> &str {
        &self.group
    }

    async fn next(&mut self) -> Result<LogRecord, LogError> {
        let msg = self.consumer.recv().await.map_err(|e| match e.rdkafka_error_code() {
            Some(RDKafkaErrorCode::Fatal) => LogError::Closed {
                group: self.group.clone(),
            },
            _ => LogError::Unavailable(e.to_string()),
        })?;
        Ok(LogRecord {
            topic: msg.topic().to_string(),
            partition: msg.partition().max(0) as usize,
            offset: msg.offset().max(0) as u64,
            key: msg
                .key()
                .and_then(|k| std::str::from_utf8(k).ok())
                .map(str::to_string),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let commit_err = |e: rdkafka::error::KafkaError| LogError::Commit {
            group: self.group.clone(),
            reason: e.to_string(),
        };
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &record.topic,
            record.partition as i32,
            Offset::Offset(record.offset as i64 + 1),
        )
        .map_err(commit_err)?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(commit_err)
    }
}
