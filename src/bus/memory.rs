use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::info;

use super::{Delivery, EventLog, LogRecord, Subscription};
use crate::error::LogError;

#[derive(Clone, Debug)]
struct StoredRecord {
    key: Option<String>,
    payload: Vec<u8>,
}

#[derive(Default)]
struct TopicState {
    partitions: Vec<Vec<StoredRecord>>,
    /// group -> next offset to deliver, per partition
    committed: HashMap<String, Vec<u64>>,
}

impl TopicState {
    fn new(partitions: usize) -> Self {
        Self {
            partitions: vec![Vec::new(); partitions],
            committed: HashMap::new(),
        }
    }
}

struct Inner {
    partitions: usize,
    topics: Mutex<HashMap<String, TopicState>>,
    injected_read_failures: Mutex<HashMap<String, usize>>,
    publish_failures: Mutex<usize>,
    closed: AtomicBool,
    notify: Notify,
}

impl Inner {
    fn topics(&self) -> Result<MutexGuard<'_, HashMap<String, TopicState>>, LogError> {
        self.topics
            .lock()
            .map_err(|_| LogError::Unavailable("log state poisoned".to_string()))
    }

    fn take_injected_failure(&self, group: &str) -> bool {
        let Ok(mut failures) = self.injected_read_failures.lock() else {
            return false;
        };
        match failures.get_mut(group) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

/// In-process partitioned log with per-group committed offsets.
///
/// Cloning shares the underlying log. Subscriptions opened for a group resume
/// from that group's committed offsets, so anything read but not committed is
/// delivered again.
#[derive(Clone)]
pub struct MemoryEventLog {
    inner: Arc<Inner>,
}

impl MemoryEventLog {
    pub fn new(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                topics: Mutex::new(HashMap::new()),
                injected_read_failures: Mutex::new(HashMap::new()),
                publish_failures: Mutex::new(0),
                closed: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    /// Stable key -> partition mapping.
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.inner.partitions as u64) as usize
    }

    /// Total records appended to `topic` across partitions.
    pub fn len(&self, topic: &str) -> usize {
        self.inner
            .topics()
            .map(|topics| {
                topics
                    .get(topic)
                    .map(|t| t.partitions.iter().map(Vec::len).sum())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Records `group` has not committed yet on `topic`.
    pub fn lag(&self, topic: &str, group: &str) -> u64 {
        let Ok(topics) = self.inner.topics() else {
            return 0;
        };
        let Some(state) = topics.get(topic) else {
            return 0;
        };
        state
            .partitions
            .iter()
            .enumerate()
            .map(|(p, records)| {
                let done = state.committed.get(group).map(|c| c[p]).unwrap_or(0);
                records.len() as u64 - done.min(records.len() as u64)
            })
            .sum()
    }

    /// Makes the next `n` reads for `group` fail with a transient error.
    pub fn fail_next_reads(&self, group: &str, n: usize) {
        if let Ok(mut failures) = self.inner.injected_read_failures.lock() {
            *failures.entry(group.to_string()).or_insert(0) += n;
        }
    }

    /// Shuts the log down: publishes fail, open subscriptions and new
    /// subscribers get [`LogError::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        info!("🔌 [LOG] memory log closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Makes the next `n` publishes fail.
    pub fn fail_next_publishes(&self, n: usize) {
        if let Ok(mut failures) = self.inner.publish_failures.lock() {
            *failures += n;
        }
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
        _timeout: Duration,
    ) -> Result<Delivery, LogError> {
        if self.is_closed() {
            return Err(LogError::Publish {
                topic: topic.to_string(),
                reason: "log closed".to_string(),
            });
        }
        if let Ok(mut failures) = self.inner.publish_failures.lock() {
            if *failures > 0 {
                *failures -= 1;
                return Err(LogError::Publish {
                    topic: topic.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
        }

        let partition = self.partition_for(key);
        let delivery = {
            let mut topics = self.inner.topics()?;
            let state = topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicState::new(self.inner.partitions));
            let records = &mut state.partitions[partition];
            records.push(StoredRecord {
                key: Some(key.to_string()),
                payload,
            });
            Delivery {
                partition,
                offset: (records.len() - 1) as u64,
            }
        };
        self.inner.notify.notify_waiters();
        Ok(delivery)
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>, LogError> {
        if self.is_closed() {
            return Err(LogError::Closed {
                group: group.to_string(),
            });
        }
        let positions = {
            let mut topics = self.inner.topics()?;
            let state = topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicState::new(self.inner.partitions));
            state
                .committed
                .entry(group.to_string())
                .or_insert_with(|| vec![0; self.inner.partitions])
                .clone()
        };
        info!(
            "📡 [LOG] group {} subscribed to {} at offsets {:?}",
            group, topic, positions
        );
        Ok(Box::new(MemorySubscription {
            inner: self.inner.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            positions,
            next_partition: 0,
        }))
    }
}

struct MemorySubscription {
    inner: Arc<Inner>,
    topic: String,
    group: String,
    /// Local read cursor, ahead of the committed offsets by in-flight records.
    positions: Vec<u64>,
    next_partition: usize,
}

impl MemorySubscription {
    fn poll_record(&mut self) -> Result<Option<LogRecord>, LogError> {
        let topics = self.inner.topics()?;
        let Some(state) = topics.get(&self.topic) else {
            return Ok(None);
        };
        let count = state.partitions.len();
        for step in 0..count {
            let partition = (self.next_partition + step) % count;
            let offset = self.positions[partition];
            if let Some(stored) = state.partitions[partition].get(offset as usize) {
                self.positions[partition] += 1;
                // rotate so one busy symbol cannot starve the others
                self.next_partition = (partition + 1) % count;
                return Ok(Some(LogRecord {
                    topic: self.topic.clone(),
                    partition,
                    offset,
                    key: stored.key.clone(),
                    payload: stored.payload.clone(),
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn group(&self) -> &str {
        &self.group
    }

    async fn next(&mut self) -> Result<LogRecord, LogError> {
        if self.inner.take_injected_failure(&self.group) {
            return Err(LogError::Unavailable(format!(
                "injected read failure for {}",
                self.group
            )));
        }

        let inner = self.inner.clone();
        loop {
            // register interest before checking so a concurrent publish is not missed
            let notified = inner.notify.notified();
            if inner.closed.load(Ordering::SeqCst) {
                return Err(LogError::Closed {
                    group: self.group.clone(),
                });
            }
            if let Some(record) = self.poll_record()? {
                return Ok(record);
            }
            notified.await;
        }
    }

    async fn commit(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let mut topics = self.inner.topics()?;
        let state = topics.get_mut(&record.topic).ok_or_else(|| LogError::Commit {
            group: self.group.clone(),
            reason: format!("unknown topic {}", record.topic),
        })?;
        let committed = state
            .committed
            .entry(self.group.clone())
            .or_insert_with(|| vec![0; self.inner.partitions]);
        let next = record.offset + 1;
        if committed[record.partition] < next {
            committed[record.partition] = next;
        }
        Ok(())
    }
}
