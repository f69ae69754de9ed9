//! Test utilities shared by the integration tests.
//!
//! Provides:
//! - A scripted offset client with per-partition end offsets and failures
//! - A sink that records every registration it receives
//! - `wait_for` polling helper

#![allow(dead_code)]

use async_trait::async_trait;
use lagmeter::{
    BrokerQueryError, GaugeRegistry, LagCalculator, LagInterceptor, LagTags, LagValue,
    MetricsSink, OffsetClient, PartitionKey, RegistrationError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Offset client whose answers are set by the test.
#[derive(Default)]
pub struct ScriptedOffsets {
    end_offsets: Mutex<HashMap<PartitionKey, i64>>,
    failing: Mutex<bool>,
    pub queries: AtomicUsize,
}

impl ScriptedOffsets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_end_offset(&self, key: &PartitionKey, end_offset: i64) {
        self.end_offsets
            .lock()
            .unwrap()
            .insert(key.clone(), end_offset);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl OffsetClient for ScriptedOffsets {
    async fn end_offset(&self, key: &PartitionKey) -> Result<i64, BrokerQueryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent callers interleave
        tokio::task::yield_now().await;

        if *self.failing.lock().unwrap() {
            return Err(BrokerQueryError::Transport("connection reset".into()));
        }
        self.end_offsets
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .ok_or_else(|| BrokerQueryError::UnknownPartition(key.clone()))
    }
}

/// One registration received by [`RecordingSink`].
#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub tags: LagTags,
    pub value: LagValue,
}

/// Sink that remembers every registration.
#[derive(Default)]
pub struct RecordingSink {
    registrations: Mutex<Vec<Registration>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().unwrap().clone()
    }

    /// Number of registrations received for `key`.
    pub fn count_for(&self, key: &PartitionKey) -> usize {
        self.registrations
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.tags.topic == key.topic && r.tags.partition == key.partition)
            .count()
    }
}

impl MetricsSink for RecordingSink {
    fn register(
        &self,
        name: &str,
        _description: &str,
        tags: &LagTags,
        value: LagValue,
    ) -> Result<(), RegistrationError> {
        self.registrations.lock().unwrap().push(Registration {
            name: name.to_string(),
            tags: tags.clone(),
            value,
        });
        Ok(())
    }
}

/// Interceptor over a fresh registry backed by `sink`.
pub fn interceptor(sink: Arc<RecordingSink>) -> LagInterceptor {
    let registry = Arc::new(GaugeRegistry::new(sink));
    LagInterceptor::new(registry, LagCalculator::new())
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
