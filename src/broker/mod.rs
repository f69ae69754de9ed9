//! Broker offset queries.
//!
//! The core only needs one thing from a broker: the end offset (high-water
//! mark) of a partition. [`OffsetClient`] is that seam; [`memory`] provides
//! an in-process broker used by the demo runtime and tests.

pub mod memory;

pub use memory::{InMemoryBroker, Record};

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::BrokerQueryError;
use crate::partition::PartitionKey;

/// Handle used to ask a broker for partition end offsets.
#[async_trait]
pub trait OffsetClient: Send + Sync {
    /// Offset immediately after the newest record in `key`.
    async fn end_offset(&self, key: &PartitionKey) -> Result<i64, BrokerQueryError>;

    /// End offsets for several partitions in one call.
    ///
    /// Semantics are per partition; the first failure aborts the batch.
    async fn end_offsets(
        &self,
        keys: &[PartitionKey],
    ) -> Result<HashMap<PartitionKey, i64>, BrokerQueryError> {
        let mut offsets = HashMap::with_capacity(keys.len());
        for key in keys {
            offsets.insert(key.clone(), self.end_offset(key).await?);
        }
        Ok(offsets)
    }
}
