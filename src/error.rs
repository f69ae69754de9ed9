//! Error taxonomy for lag recording.
//!
//! None of these errors ever reach the caller of an instrumented handler;
//! they exist so the recording path can log precisely what went wrong.

use std::time::Duration;

use crate::partition::PartitionKey;

/// Failure fetching a partition's end offset from the broker.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerQueryError {
    #[error("end offset query timed out after {0:?}")]
    Timeout(Duration),

    #[error("unknown partition: {0}")]
    UnknownPartition(PartitionKey),

    #[error("broker transport error: {0}")]
    Transport(String),
}

/// The metrics sink refused a gauge registration.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to register gauge {name} for {key}: {reason}")]
pub struct RegistrationError {
    pub name: String,
    pub key: PartitionKey,
    pub reason: String,
}

/// Fields of a consumption event the upstream failed to supply.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("missing event metadata: {}", .fields.join(", "))]
pub struct MissingMetadata {
    pub fields: Vec<&'static str>,
}

/// Why a single recording attempt did not update a gauge.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    MissingMetadata(#[from] MissingMetadata),

    #[error(transparent)]
    BrokerQuery(#[from] BrokerQueryError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}
