//! Handler decorator that records consumer lag.
//!
//! The call site wraps its handler explicitly:
//!
//! ```no_run
//! # use lagmeter::{ConsumptionEvent, LagInterceptor};
//! # async fn example(interceptor: LagInterceptor, event: ConsumptionEvent) {
//! let result: Result<(), std::io::Error> = interceptor
//!     .instrument(&event, async {
//!         // business logic
//!         Ok(())
//!     })
//!     .await;
//! # }
//! ```
//!
//! Lag is recorded only after the handler succeeds. Whatever happens while
//! recording, the handler's result is returned untouched.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::RecordError;
use crate::event::ConsumptionEvent;
use crate::lag::LagCalculator;
use crate::registry::GaugeRegistry;

/// Wraps handler invocations and records lag as a side effect.
///
/// Cheap to clone; every clone shares the same registry.
#[derive(Debug, Clone)]
pub struct LagInterceptor {
    registry: Arc<GaugeRegistry>,
    calculator: LagCalculator,
}

impl LagInterceptor {
    pub fn new(registry: Arc<GaugeRegistry>, calculator: LagCalculator) -> Self {
        Self {
            registry,
            calculator,
        }
    }

    pub fn registry(&self) -> &Arc<GaugeRegistry> {
        &self.registry
    }

    /// Run `handler`, then record lag for `event` if it succeeded.
    pub async fn instrument<F, T, E>(&self, event: &ConsumptionEvent, handler: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let result = handler.await;
        if result.is_ok() {
            self.record_best_effort(event).await;
        }
        result
    }

    /// Same as [`instrument`](Self::instrument) for a synchronous handler.
    pub async fn instrument_sync<F, T, E>(&self, event: &ConsumptionEvent, handler: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let result = handler();
        if result.is_ok() {
            self.record_best_effort(event).await;
        }
        result
    }

    /// Measure and record lag for `event`, returning the recorded value.
    ///
    /// At most one registry update happens per call, and only once the end
    /// offset is known; a failed query leaves any existing gauge unchanged.
    pub async fn record(&self, event: &ConsumptionEvent) -> Result<u64, RecordError> {
        let resolved = event.resolve()?;
        let lag = self
            .calculator
            .measure(resolved.client.as_ref(), &resolved.key, resolved.offset)
            .await?;
        self.registry
            .record_lag(&resolved.key, &resolved.tags(), lag)?;
        Ok(lag)
    }

    async fn record_best_effort(&self, event: &ConsumptionEvent) {
        let outcome = AssertUnwindSafe(self.record(event)).catch_unwind().await;

        match outcome {
            Ok(Ok(lag)) => {
                tracing::trace!(?event, lag, "Updated lag metric");
            }
            Ok(Err(RecordError::MissingMetadata(e))) => {
                tracing::warn!(
                    missing = ?e.fields,
                    "Could not record lag metric: consumption event must carry an offset client, topic, partition, offset and group id"
                );
            }
            Ok(Err(RecordError::BrokerQuery(e))) => {
                tracing::warn!(error = %e, ?event, "Could not record lag metric: end offset query failed");
            }
            Ok(Err(RecordError::Registration(e))) => {
                // The registry already logged this at error level
                tracing::debug!(error = %e, "Lag gauge unavailable");
            }
            Err(_) => {
                tracing::error!(?event, "Panic while recording lag metric");
            }
        }
    }
}
