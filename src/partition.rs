//! Partition keys and the tag set attached to each lag gauge.

use serde::Serialize;
use std::fmt;

/// Identifies one partition of one topic.
///
/// Equality and hashing are by value; a key uniquely identifies a gauge.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct PartitionKey {
    pub topic: String,
    pub partition: i32,
}

impl PartitionKey {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Label set fixed on a gauge when it is first created.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LagTags {
    pub group_id: String,
    pub topic: String,
    pub partition: i32,
}

impl LagTags {
    /// Label names, in the order returned by [`LagTags::pairs`].
    pub const LABELS: [&'static str; 3] = ["group_id", "topic", "partition"];

    pub fn new(group_id: impl Into<String>, key: &PartitionKey) -> Self {
        Self {
            group_id: group_id.into(),
            topic: key.topic.clone(),
            partition: key.partition,
        }
    }

    /// Tags as (label, value) pairs for metrics backends.
    pub fn pairs(&self) -> [(&'static str, String); 3] {
        [
            (Self::LABELS[0], self.group_id.clone()),
            (Self::LABELS[1], self.topic.clone()),
            (Self::LABELS[2], self.partition.to_string()),
        ]
    }
}
