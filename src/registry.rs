//! Gauge registry: one live lag gauge per partition.
//!
//! Gauges are created on first sight of a partition, registered with the
//! metrics sink exactly once, and then only have their value updated. There
//! is no removal path; a partition's gauge lives as long as the registry.

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::RegistrationError;
use crate::observability::metrics::MetricsSink;
use crate::partition::{LagTags, PartitionKey};
use crate::{DEFAULT_METRIC_NAME, METRIC_DESCRIPTION};

/// Shared, lock-free lag value.
///
/// The registry writes it; metrics sinks hold a clone and read it whenever
/// they are scraped.
#[derive(Clone, Debug, Default)]
pub struct LagValue(Arc<AtomicU64>);

impl LagValue {
    pub fn new(initial: u64) -> Self {
        Self(Arc::new(AtomicU64::new(initial)))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, value: u64) {
        self.0.store(value, Ordering::SeqCst);
    }
}

/// Per-partition gauge state.
#[derive(Debug)]
struct LagGauge {
    tags: LagTags,
    value: LagValue,
    /// False when the sink rejected the registration.
    observable: bool,
}

/// Point-in-time view of one gauge.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GaugeSnapshot {
    #[serde(flatten)]
    pub tags: LagTags,
    pub lag: u64,
    pub observable: bool,
}

/// Registry owning every lag gauge in the process.
///
/// Shared by reference (usually `Arc<GaugeRegistry>`) between all consumer
/// tasks. Updates to existing gauges take the read lock only; creation takes
/// the write lock so that concurrent first sight of a key registers once.
pub struct GaugeRegistry {
    metric_name: String,
    sink: Arc<dyn MetricsSink>,
    gauges: RwLock<HashMap<PartitionKey, LagGauge>>,
}

impl std::fmt::Debug for GaugeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeRegistry")
            .field("metric_name", &self.metric_name)
            .field("gauges", &self.len())
            .finish_non_exhaustive()
    }
}

impl GaugeRegistry {
    /// Create a registry publishing under the default metric name.
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self::with_metric_name(sink, DEFAULT_METRIC_NAME)
    }

    /// Create a registry publishing under `metric_name`.
    pub fn with_metric_name(sink: Arc<dyn MetricsSink>, metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            sink,
            gauges: RwLock::new(HashMap::new()),
        }
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Record the current lag of `key`.
    ///
    /// On first sight the gauge is created with `tags` and registered with
    /// the sink; later calls only store the new value. A registration failure
    /// (including a panicking sink) is returned once; the gauge is kept so it
    /// is never registered twice.
    pub fn record_lag(
        &self,
        key: &PartitionKey,
        tags: &LagTags,
        value: u64,
    ) -> Result<(), RegistrationError> {
        {
            let gauges = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(gauge) = gauges.get(key) {
                gauge.value.set(value);
                return Ok(());
            }
        }

        let mut gauges = self.gauges.write().unwrap_or_else(PoisonError::into_inner);
        match gauges.entry(key.clone()) {
            // Another task created it between our read and write locks
            Entry::Occupied(entry) => {
                entry.get().value.set(value);
                Ok(())
            }
            Entry::Vacant(entry) => {
                let value = LagValue::new(value);
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.sink
                        .register(&self.metric_name, METRIC_DESCRIPTION, tags, value.clone())
                }))
                .unwrap_or_else(|_| {
                    Err(RegistrationError {
                        name: self.metric_name.clone(),
                        key: key.clone(),
                        reason: "metrics sink panicked".into(),
                    })
                });

                match &result {
                    Ok(()) => tracing::debug!(
                        metric = %self.metric_name,
                        group_id = %tags.group_id,
                        topic = %tags.topic,
                        partition = tags.partition,
                        "Registered lag gauge"
                    ),
                    Err(e) => tracing::error!(
                        error = %e,
                        "Lag gauge registration rejected; partition will not be observable"
                    ),
                }

                entry.insert(LagGauge {
                    tags: tags.clone(),
                    value,
                    observable: result.is_ok(),
                });
                result
            }
        }
    }

    /// Current lag recorded for `key`.
    pub fn get(&self, key: &PartitionKey) -> Option<u64> {
        let gauges = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        gauges.get(key).map(|g| g.value.get())
    }

    /// Tags fixed on the gauge for `key`.
    pub fn tags(&self, key: &PartitionKey) -> Option<LagTags> {
        let gauges = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        gauges.get(key).map(|g| g.tags.clone())
    }

    pub fn len(&self) -> usize {
        self.gauges.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All gauges, ordered by topic then partition.
    pub fn snapshot(&self) -> Vec<GaugeSnapshot> {
        let gauges = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = gauges.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(_, g)| GaugeSnapshot {
                tags: g.tags.clone(),
                lag: g.value.get(),
                observable: g.observable,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Barrier, Mutex};

    /// Sink that remembers every registration it receives.
    #[derive(Default)]
    struct RecordingSink {
        registered: Mutex<Vec<(String, LagTags, LagValue)>>,
        reject: bool,
    }

    impl MetricsSink for RecordingSink {
        fn register(
            &self,
            name: &str,
            _description: &str,
            tags: &LagTags,
            value: LagValue,
        ) -> Result<(), RegistrationError> {
            if self.reject {
                return Err(RegistrationError {
                    name: name.to_string(),
                    key: PartitionKey::new(tags.topic.clone(), tags.partition),
                    reason: "rejected".into(),
                });
            }
            self.registered
                .lock()
                .unwrap()
                .push((name.to_string(), tags.clone(), value));
            Ok(())
        }
    }

    fn key(partition: i32) -> PartitionKey {
        PartitionKey::new("orders", partition)
    }

    fn tags(partition: i32) -> LagTags {
        LagTags::new("billing", &key(partition))
    }

    #[test]
    fn test_first_sight_registers_gauge() {
        let sink = Arc::new(RecordingSink::default());
        let registry = GaugeRegistry::new(sink.clone());

        registry.record_lag(&key(0), &tags(0), 20).unwrap();

        let registered = sink.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].0, DEFAULT_METRIC_NAME);
        assert_eq!(registered[0].1, tags(0));
        assert_eq!(registered[0].2.get(), 20);
        assert_eq!(registry.get(&key(0)), Some(20));
    }

    #[test]
    fn test_repeat_record_updates_value_only() {
        let sink = Arc::new(RecordingSink::default());
        let registry = GaugeRegistry::new(sink.clone());

        registry.record_lag(&key(0), &tags(0), 20).unwrap();
        registry.record_lag(&key(0), &tags(0), 7).unwrap();

        let registered = sink.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        // The sink observes the latest value through its accessor
        assert_eq!(registered[0].2.get(), 7);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_tags_fixed_at_creation() {
        let registry = GaugeRegistry::new(Arc::new(RecordingSink::default()));

        registry.record_lag(&key(0), &tags(0), 1).unwrap();
        let other = LagTags::new("another-group", &key(0));
        registry.record_lag(&key(0), &other, 2).unwrap();

        assert_eq!(registry.tags(&key(0)), Some(tags(0)));
        assert_eq!(registry.get(&key(0)), Some(2));
    }

    #[test]
    fn test_registration_failure_is_not_retried() {
        let sink = Arc::new(RecordingSink {
            reject: true,
            ..Default::default()
        });
        let registry = GaugeRegistry::new(sink);

        assert!(registry.record_lag(&key(0), &tags(0), 5).is_err());
        // Second call must not attempt another registration
        assert!(registry.record_lag(&key(0), &tags(0), 6).is_ok());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot[0].observable);
        assert_eq!(snapshot[0].lag, 6);
    }

    #[test]
    fn test_panicking_sink_is_registered_once() {
        struct PanickingSink {
            calls: std::sync::atomic::AtomicUsize,
        }

        impl MetricsSink for PanickingSink {
            fn register(
                &self,
                _name: &str,
                _description: &str,
                _tags: &LagTags,
                _value: LagValue,
            ) -> Result<(), RegistrationError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                panic!("sink exploded");
            }
        }

        let sink = Arc::new(PanickingSink {
            calls: Default::default(),
        });
        let registry = GaugeRegistry::new(sink.clone());

        let err = registry.record_lag(&key(0), &tags(0), 1).unwrap_err();
        assert_eq!(err.key, key(0));
        assert!(registry.record_lag(&key(0), &tags(0), 2).is_ok());

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get(&key(0)), Some(2));
        assert!(!registry.snapshot()[0].observable);
    }

    #[test]
    fn test_concurrent_first_sight_registers_once() {
        let sink = Arc::new(RecordingSink::default());
        let registry = GaugeRegistry::new(sink.clone());
        let barrier = Barrier::new(16);

        std::thread::scope(|s| {
            for i in 0..16u64 {
                let registry = &registry;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    registry.record_lag(&key(0), &tags(0), i).unwrap();
                });
            }
        });

        assert_eq!(sink.registered.lock().unwrap().len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let registry = GaugeRegistry::new(Arc::new(RecordingSink::default()));
        for p in [3, 1, 2] {
            registry.record_lag(&key(p), &tags(p), p as u64).unwrap();
        }

        let partitions: Vec<_> = registry.snapshot().iter().map(|s| s.tags.partition).collect();
        assert_eq!(partitions, vec![1, 2, 3]);
    }

    #[test]
    fn test_custom_metric_name() {
        let sink = Arc::new(RecordingSink::default());
        let registry = GaugeRegistry::with_metric_name(sink.clone(), "orders_lag");
        registry.record_lag(&key(0), &tags(0), 1).unwrap();

        assert_eq!(registry.metric_name(), "orders_lag");
        assert_eq!(sink.registered.lock().unwrap()[0].0, "orders_lag");
    }
}
