//! Per-partition consumer tasks.
//!
//! Each [`PartitionConsumer`] owns one partition: it reads records in
//! order, hands them to a [`MessageHandler`] through the lag interceptor,
//! and sleeps on the broker's notification channel when caught up.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

use crate::broker::{InMemoryBroker, OffsetClient, Record};
use crate::event::ConsumptionEvent;
use crate::intercept::LagInterceptor;
use crate::partition::PartitionKey;

/// Business logic run for every consumed record.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, key: &PartitionKey, record: &Record) -> anyhow::Result<()>;
}

/// Handler that logs each message and simulates slow processing.
#[derive(Debug, Clone, Copy)]
pub struct LoggingHandler {
    delay: Duration,
}

impl LoggingHandler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, key: &PartitionKey, record: &Record) -> anyhow::Result<()> {
        tracing::info!(
            message = %record.payload,
            partition = key.partition,
            offset = record.offset,
            "Received message"
        );
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Consumer for a single partition.
pub struct PartitionConsumer {
    broker: Arc<InMemoryBroker>,
    key: PartitionKey,
    group_id: String,
    interceptor: LagInterceptor,
    handler: Arc<dyn MessageHandler>,
    next_offset: i64,
}

impl PartitionConsumer {
    /// Consumer starting at the beginning of the partition.
    pub fn new(
        broker: Arc<InMemoryBroker>,
        key: PartitionKey,
        group_id: impl Into<String>,
        interceptor: LagInterceptor,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            broker,
            key,
            group_id: group_id.into(),
            interceptor,
            handler,
            next_offset: 0,
        }
    }

    /// Offset of the next record this consumer will read.
    pub fn position(&self) -> i64 {
        self.next_offset
    }

    /// Consume until `shutdown_rx` fires or the partition disappears.
    #[tracing::instrument(skip_all, fields(partition = %self.key, group_id = %self.group_id))]
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        // Subscribe before the first fetch so no append is missed
        let mut notifications = self.broker.subscribe();
        tracing::debug!("Partition consumer started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Partition unreadable, stopping consumer");
                    break;
                }
            }

            tokio::select! {
                _ = shutdown_rx.changed() => break,
                received = notifications.recv() => match received {
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
            }
        }

        tracing::debug!(position = self.next_offset, "Partition consumer stopped");
    }

    /// Process the next record if one is available.
    ///
    /// Returns `Ok(false)` when the consumer is caught up.
    pub async fn poll_once(&mut self) -> anyhow::Result<bool> {
        let Some(record) = self.broker.fetch(&self.key, self.next_offset)? else {
            return Ok(false);
        };

        let client: Arc<dyn OffsetClient> = self.broker.clone();
        let event =
            ConsumptionEvent::for_record(client, &self.key, record.offset, self.group_id.clone());

        let handler = Arc::clone(&self.handler);
        let key = &self.key;
        if let Err(e) = self
            .interceptor
            .instrument(&event, async { handler.handle(key, &record).await })
            .await
        {
            // No retries: the record is skipped
            tracing::warn!(error = %e, offset = record.offset, "Message handler failed");
        }

        self.next_offset = record.offset + 1;
        Ok(true)
    }
}
