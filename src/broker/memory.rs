//! In-process broker with partitioned append-only logs.
//!
//! Stands in for a real broker in the demo runtime and in tests:
//! - Topics with a fixed number of partitions
//! - Per-partition end offsets (high-water marks)
//! - `tokio::sync::broadcast` notification when new data lands
//! - Failure injection for end-offset queries

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::broadcast::{self, Receiver, Sender};

use super::OffsetClient;
use crate::error::BrokerQueryError;
use crate::partition::PartitionKey;

/// A record stored in a partition log.
#[derive(Debug, Clone)]
pub struct Record {
    pub key: String,
    pub payload: String,
    pub offset: i64,
    pub timestamp: i64,
}

/// Notification sent when a partition receives new data.
#[derive(Debug, Clone)]
pub struct NewDataNotification {
    pub key: PartitionKey,
    /// End offset after the append
    pub end_offset: i64,
}

/// Errors from produce/fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("unknown partition: {0}")]
    UnknownPartition(PartitionKey),

    #[error("topic {0} must have at least one partition")]
    NoPartitions(String),
}

/// In-memory broker.
#[derive(Debug)]
pub struct InMemoryBroker {
    topics: RwLock<HashMap<String, Vec<Vec<Record>>>>,
    sender: Sender<NewDataNotification>,
    unavailable: AtomicBool,
    failures_remaining: AtomicU32,
    query_delay: RwLock<Option<Duration>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl InMemoryBroker {
    /// Create an empty broker.
    ///
    /// `notify_capacity` bounds buffered notifications; slow subscribers
    /// drop the oldest ones and re-read end offsets instead.
    pub fn new(notify_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(notify_capacity);
        Self {
            topics: RwLock::new(HashMap::new()),
            sender,
            unavailable: AtomicBool::new(false),
            failures_remaining: AtomicU32::new(0),
            query_delay: RwLock::new(None),
        }
    }

    /// Create a topic with `partitions` empty partitions.
    ///
    /// Existing topics are left untouched.
    pub fn create_topic(&self, topic: &str, partitions: u32) -> Result<(), BrokerError> {
        if partitions == 0 {
            return Err(BrokerError::NoPartitions(topic.to_string()));
        }
        let mut topics = self.topics.write().unwrap();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions as usize]);
        Ok(())
    }

    /// Number of partitions of `topic`.
    pub fn partition_count(&self, topic: &str) -> Option<u32> {
        let topics = self.topics.read().unwrap();
        topics.get(topic).map(|p| p.len() as u32)
    }

    /// Append a record, choosing the partition by hashing `key`.
    ///
    /// Returns the partition and the offset assigned to the record.
    pub fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(i32, i64), BrokerError> {
        let count = self
            .partition_count(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;

        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let partition = (hasher.finish() % u64::from(count)) as i32;

        let offset = self.publish_to(&PartitionKey::new(topic, partition), key, payload)?;
        Ok((partition, offset))
    }

    /// Append a record to a specific partition.
    pub fn publish_to(
        &self,
        target: &PartitionKey,
        key: &str,
        payload: &str,
    ) -> Result<i64, BrokerError> {
        let end_offset = {
            let mut topics = self.topics.write().unwrap();
            let log = topics
                .get_mut(&target.topic)
                .ok_or_else(|| BrokerError::UnknownTopic(target.topic.clone()))?
                .get_mut(partition_index(target)?)
                .ok_or_else(|| BrokerError::UnknownPartition(target.clone()))?;

            let offset = log.len() as i64;
            log.push(Record {
                key: key.to_string(),
                payload: payload.to_string(),
                offset,
                timestamp: now_millis(),
            });
            offset + 1
        };

        // send() fails only when nobody is subscribed, which is fine
        let _ = self.sender.send(NewDataNotification {
            key: target.clone(),
            end_offset,
        });

        Ok(end_offset - 1)
    }

    /// Read the record at `offset`, if it has been written yet.
    pub fn fetch(&self, source: &PartitionKey, offset: i64) -> Result<Option<Record>, BrokerError> {
        let topics = self.topics.read().unwrap();
        let log = topics
            .get(&source.topic)
            .ok_or_else(|| BrokerError::UnknownTopic(source.topic.clone()))?
            .get(partition_index(source)?)
            .ok_or_else(|| BrokerError::UnknownPartition(source.clone()))?;

        Ok(usize::try_from(offset)
            .ok()
            .and_then(|i| log.get(i))
            .cloned())
    }

    /// Subscribe to new-data notifications.
    pub fn subscribe(&self) -> Receiver<NewDataNotification> {
        self.sender.subscribe()
    }

    /// Make every end-offset query fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `count` end-offset queries with a transport error.
    pub fn fail_next_queries(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Delay every end-offset query, simulating a slow broker.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        *self.query_delay.write().unwrap() = delay;
    }

    fn take_injected_failure(&self) -> bool {
        if self.unavailable.load(Ordering::SeqCst) {
            return true;
        }
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn high_water_mark(&self, key: &PartitionKey) -> Option<i64> {
        let topics = self.topics.read().unwrap();
        let index = usize::try_from(key.partition).ok()?;
        topics
            .get(&key.topic)
            .and_then(|partitions| partitions.get(index))
            .map(|log| log.len() as i64)
    }
}

#[async_trait]
impl OffsetClient for InMemoryBroker {
    async fn end_offset(&self, key: &PartitionKey) -> Result<i64, BrokerQueryError> {
        let delay = *self.query_delay.read().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.take_injected_failure() {
            return Err(BrokerQueryError::Transport("broker unavailable".into()));
        }

        self.high_water_mark(key)
            .ok_or_else(|| BrokerQueryError::UnknownPartition(key.clone()))
    }
}

fn partition_index(key: &PartitionKey) -> Result<usize, BrokerError> {
    usize::try_from(key.partition).map_err(|_| BrokerError::UnknownPartition(key.clone()))
}

/// Get the current Unix timestamp in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
