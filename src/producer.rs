//! Synthetic producer feeding the demo topic.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::broker::memory::BrokerError;
use crate::broker::InMemoryBroker;

/// Publishes UUID-keyed messages to a topic at a fixed interval.
///
/// Random keys spread messages across all partitions.
pub struct Producer {
    broker: Arc<InMemoryBroker>,
    topic: String,
    interval: Duration,
    sent: u64,
}

impl Producer {
    pub fn new(broker: Arc<InMemoryBroker>, topic: impl Into<String>, interval: Duration) -> Self {
        Self {
            broker,
            topic: topic.into(),
            interval,
            sent: 0,
        }
    }

    /// Publish one message, returning its partition and offset.
    pub fn send(&mut self, message: &str) -> Result<(i32, i64), BrokerError> {
        let key = Uuid::now_v7().to_string();
        let (partition, offset) = self.broker.publish(&self.topic, &key, message)?;
        self.sent += 1;
        tracing::debug!(topic = %self.topic, %key, partition, offset, "Message sent");
        Ok((partition, offset))
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Produce until `shutdown_rx` fires.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(topic = %self.topic, interval = ?self.interval, "Producer started");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    let message = format!("message-{}", self.sent + 1);
                    if let Err(e) = self.send(&message) {
                        tracing::error!(error = %e, "Producer cannot publish, stopping");
                        break;
                    }
                }
            }
        }

        tracing::info!(sent = self.sent, "Producer stopped");
    }
}
