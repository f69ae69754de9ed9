//! Lag arithmetic and end-offset measurement.

use std::time::Duration;

use crate::broker::OffsetClient;
use crate::error::BrokerQueryError;
use crate::partition::PartitionKey;

/// Lag between a partition's end offset and the last processed offset.
///
/// Clamped at zero: a processed offset momentarily ahead of the last
/// fetched end offset reports no lag.
pub fn compute_lag(end_offset: i64, processed_offset: i64) -> u64 {
    u64::try_from(end_offset.saturating_sub(processed_offset)).unwrap_or(0)
}

/// Queries end offsets and turns them into lag values.
///
/// Never retries; a failed query is reported to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct LagCalculator {
    timeout: Option<Duration>,
}

impl LagCalculator {
    /// Calculator whose broker queries are not bounded in time.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Calculator that gives up on a broker query after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Fetch the end offset of `key` and compute the lag of `processed_offset`.
    pub async fn measure(
        &self,
        client: &dyn OffsetClient,
        key: &PartitionKey,
        processed_offset: i64,
    ) -> Result<u64, BrokerQueryError> {
        let end_offset = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, client.end_offset(key))
                .await
                .map_err(|_| BrokerQueryError::Timeout(limit))??,
            None => client.end_offset(key).await?,
        };

        let lag = compute_lag(end_offset, processed_offset);
        tracing::trace!(
            partition = %key,
            end_offset,
            processed_offset,
            lag,
            "Measured consumer lag"
        );
        Ok(lag)
    }
}
