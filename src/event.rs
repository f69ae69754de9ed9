//! Consumption events supplied per handler invocation.
//!
//! The upstream consumer assembles a [`ConsumptionEvent`] before invoking
//! an instrumented handler. Any field may be left out; an incomplete event
//! simply means lag is not recorded for that invocation.

use std::fmt;
use std::sync::Arc;

use crate::broker::OffsetClient;
use crate::error::MissingMetadata;
use crate::partition::{LagTags, PartitionKey};

/// Metadata describing one processed record.
#[derive(Clone, Default)]
pub struct ConsumptionEvent {
    client: Option<Arc<dyn OffsetClient>>,
    topic: Option<String>,
    partition: Option<i32>,
    offset: Option<i64>,
    group_id: Option<String>,
}

impl fmt::Debug for ConsumptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumptionEvent")
            .field("client", &self.client.as_ref().map(|_| "OffsetClient"))
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("offset", &self.offset)
            .field("group_id", &self.group_id)
            .finish()
    }
}

impl ConsumptionEvent {
    /// An empty event; fill it in with the `with_*` methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fully populated event.
    pub fn for_record(
        client: Arc<dyn OffsetClient>,
        key: &PartitionKey,
        offset: i64,
        group_id: impl Into<String>,
    ) -> Self {
        Self::new()
            .with_client(client)
            .with_topic(key.topic.clone())
            .with_partition(key.partition)
            .with_offset(offset)
            .with_group_id(group_id)
    }

    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn OffsetClient>) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Check that every field needed to record lag is present.
    pub fn resolve(&self) -> Result<ResolvedEvent, MissingMetadata> {
        let mut missing = Vec::new();
        if self.client.is_none() {
            missing.push("offset_client");
        }
        if self.topic.is_none() {
            missing.push("topic");
        }
        if self.partition.is_none() {
            missing.push("partition");
        }
        if self.offset.is_none() {
            missing.push("offset");
        }
        if self.group_id.is_none() {
            missing.push("group_id");
        }

        match (
            &self.client,
            &self.topic,
            self.partition,
            self.offset,
            &self.group_id,
        ) {
            (Some(client), Some(topic), Some(partition), Some(offset), Some(group_id)) => {
                Ok(ResolvedEvent {
                    client: Arc::clone(client),
                    key: PartitionKey::new(topic.clone(), partition),
                    offset,
                    group_id: group_id.clone(),
                })
            }
            _ => Err(MissingMetadata { fields: missing }),
        }
    }
}

/// A consumption event with every required field present.
pub struct ResolvedEvent {
    pub client: Arc<dyn OffsetClient>,
    pub key: PartitionKey,
    pub offset: i64,
    pub group_id: String,
}

impl std::fmt::Debug for ResolvedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedEvent")
            .field("key", &self.key)
            .field("offset", &self.offset)
            .field("group_id", &self.group_id)
            .finish_non_exhaustive()
    }
}

impl ResolvedEvent {
    pub fn tags(&self) -> LagTags {
        LagTags::new(self.group_id.clone(), &self.key)
    }
}
