//! Metrics sinks for lag gauges.
//!
//! A sink receives each gauge once, together with a [`LagValue`] handle it
//! reads whenever the backend samples:
//! - [`PrometheusSink`]: collector per gauge, read at scrape time
//! - [`OtelSink`]: OpenTelemetry observable gauge, read at export time
//! - [`FanoutSink`]: registers with several sinks at once

use opentelemetry::metrics::{Meter, MeterProvider, ObservableGauge};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntGauge, Opts, Registry};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::RegistrationError;
use crate::partition::{LagTags, PartitionKey};
use crate::registry::LagValue;

/// Destination for lag gauges.
///
/// The gauge registry calls `register` at most once per partition.
pub trait MetricsSink: Send + Sync {
    fn register(
        &self,
        name: &str,
        description: &str,
        tags: &LagTags,
        value: LagValue,
    ) -> Result<(), RegistrationError>;
}

fn registration_error(name: &str, tags: &LagTags, reason: impl ToString) -> RegistrationError {
    RegistrationError {
        name: name.to_string(),
        key: PartitionKey::new(tags.topic.clone(), tags.partition),
        reason: reason.to_string(),
    }
}

/// Prometheus collector exposing one lag value.
struct LagCollector {
    gauge: IntGauge,
    value: LagValue,
}

impl Collector for LagCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauge.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gauge
            .set(i64::try_from(self.value.get()).unwrap_or(i64::MAX));
        self.gauge.collect()
    }
}

/// Sink backed by a Prometheus registry.
#[derive(Clone, Default)]
pub struct PrometheusSink {
    registry: Registry,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    /// Registry to hand to the scrape endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl MetricsSink for PrometheusSink {
    fn register(
        &self,
        name: &str,
        description: &str,
        tags: &LagTags,
        value: LagValue,
    ) -> Result<(), RegistrationError> {
        let opts = tags
            .pairs()
            .into_iter()
            .fold(Opts::new(name, description), |opts, (label, v)| {
                opts.const_label(label.to_string(), v)
            });

        let gauge = IntGauge::with_opts(opts).map_err(|e| registration_error(name, tags, e))?;
        self.registry
            .register(Box::new(LagCollector { gauge, value }))
            .map_err(|e| registration_error(name, tags, e))
    }
}

/// Sink backed by an OpenTelemetry meter.
pub struct OtelSink {
    meter: Meter,
    // Instruments are kept so their callbacks stay registered
    gauges: Mutex<Vec<ObservableGauge<u64>>>,
}

impl OtelSink {
    pub fn new(meter: Meter) -> Self {
        Self {
            meter,
            gauges: Mutex::new(Vec::new()),
        }
    }
}

impl MetricsSink for OtelSink {
    fn register(
        &self,
        name: &str,
        description: &str,
        tags: &LagTags,
        value: LagValue,
    ) -> Result<(), RegistrationError> {
        let attrs: Vec<KeyValue> = tags
            .pairs()
            .into_iter()
            .map(|(label, v)| KeyValue::new(label, v))
            .collect();

        let gauge = self
            .meter
            .u64_observable_gauge(name.to_string())
            .with_description(description.to_string())
            .with_unit("1")
            .with_callback(move |observer| observer.observe(value.get(), &attrs))
            .init();

        self.gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(gauge);
        Ok(())
    }
}

/// Sink that registers each gauge with every inner sink.
///
/// Every inner sink is attempted. The gauge counts as registered when at least
/// one sink accepted it; individual rejections are logged. Only when every
/// sink rejects it is the first error returned.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        Self { sinks }
    }
}

impl MetricsSink for FanoutSink {
    fn register(
        &self,
        name: &str,
        description: &str,
        tags: &LagTags,
        value: LagValue,
    ) -> Result<(), RegistrationError> {
        let mut accepted = false;
        let mut first_error = None;

        for sink in &self.sinks {
            match sink.register(name, description, tags, value.clone()) {
                Ok(()) => accepted = true,
                Err(e) => {
                    tracing::warn!(error = %e, "Metrics backend rejected lag gauge");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if !accepted => Err(e),
            _ => Ok(()),
        }
    }
}

/// Build the OpenTelemetry meter provider.
///
/// With an endpoint, metrics are pushed to an OTLP collector every 10
/// seconds. Without one (or if the exporter cannot be built), a manual
/// reader is installed: gauges are recorded but not exported.
pub fn build_meter_provider(otel_endpoint: Option<&str>) -> SdkMeterProvider {
    if let Some(endpoint) = otel_endpoint {
        use opentelemetry_otlp::{Protocol, WithExportConfig};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .with_protocol(Protocol::Grpc);

        match opentelemetry_otlp::new_pipeline()
            .metrics(opentelemetry_sdk::runtime::Tokio)
            .with_exporter(exporter)
            .with_period(std::time::Duration::from_secs(10))
            .build()
        {
            Ok(provider) => {
                tracing::info!(endpoint, "OTLP metrics exporter configured");
                return provider;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create OTLP exporter, metrics will not be exported");
            }
        }
    }

    let reader = ManualReader::builder().build();
    SdkMeterProvider::builder().with_reader(reader).build()
}

/// Meter used for lag gauges.
pub fn lag_meter(provider: &SdkMeterProvider) -> Meter {
    provider.meter("lagmeter")
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::metrics::data::{Gauge, ResourceMetrics, Temporality};
    use opentelemetry_sdk::metrics::reader::{MetricReader, TemporalitySelector};
    use opentelemetry_sdk::metrics::{InstrumentKind, Pipeline};
    use opentelemetry_sdk::Resource;
    use std::sync::Weak;

    fn tags(partition: i32) -> LagTags {
        LagTags::new("billing", &PartitionKey::new("orders", partition))
    }

    fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> Option<&'a str> {
        metric
            .get_label()
            .iter()
            .find(|l| l.get_name() == name)
            .map(|l| l.get_value())
    }

    #[test]
    fn test_prometheus_reads_value_at_scrape_time() {
        let sink = PrometheusSink::new();
        let value = LagValue::new(20);
        sink.register("kafka_consumer_lag", "lag", &tags(0), value.clone())
            .unwrap();

        let families = sink.registry().gather();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_name(), "kafka_consumer_lag");
        let metric = &families[0].get_metric()[0];
        assert_eq!(metric.get_gauge().get_value(), 20.0);
        assert_eq!(label(metric, "group_id"), Some("billing"));
        assert_eq!(label(metric, "topic"), Some("orders"));
        assert_eq!(label(metric, "partition"), Some("0"));

        value.set(3);
        let families = sink.registry().gather();
        assert_eq!(families[0].get_metric()[0].get_gauge().get_value(), 3.0);
    }

    #[test]
    fn test_prometheus_one_family_many_partitions() {
        let sink = PrometheusSink::new();
        for p in 0..3 {
            sink.register("kafka_consumer_lag", "lag", &tags(p), LagValue::new(p as u64))
                .unwrap();
        }

        let families = sink.registry().gather();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_metric().len(), 3);
    }

    #[test]
    fn test_prometheus_rejects_duplicate() {
        let sink = PrometheusSink::new();
        sink.register("kafka_consumer_lag", "lag", &tags(0), LagValue::default())
            .unwrap();

        let err = sink
            .register("kafka_consumer_lag", "lag", &tags(0), LagValue::default())
            .unwrap_err();
        assert_eq!(err.key, PartitionKey::new("orders", 0));
    }

    #[test]
    fn test_prometheus_rejects_invalid_name() {
        let sink = PrometheusSink::new();
        let result = sink.register("kafka.consumer.lag", "lag", &tags(0), LagValue::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_fanout_registers_everywhere() {
        let a = PrometheusSink::new();
        let b = PrometheusSink::new();
        let sinks: Vec<Arc<dyn MetricsSink>> = vec![Arc::new(a.clone()), Arc::new(b.clone())];
        let fanout = FanoutSink::new(sinks);

        fanout
            .register("kafka_consumer_lag", "lag", &tags(1), LagValue::new(9))
            .unwrap();

        assert_eq!(a.registry().gather().len(), 1);
        assert_eq!(b.registry().gather().len(), 1);
    }

    #[test]
    fn test_fanout_partial_failure_still_registers() {
        let a = PrometheusSink::new();
        a.register("kafka_consumer_lag", "lag", &tags(1), LagValue::default())
            .unwrap();
        let b = PrometheusSink::new();
        let sinks: Vec<Arc<dyn MetricsSink>> = vec![Arc::new(a), Arc::new(b.clone())];
        let fanout = FanoutSink::new(sinks);

        // `a` rejects the duplicate, `b` accepts it
        fanout
            .register("kafka_consumer_lag", "lag", &tags(1), LagValue::new(9))
            .unwrap();
        assert_eq!(b.registry().gather().len(), 1);
    }

    #[test]
    fn test_fanout_fails_when_every_sink_rejects() {
        let sinks: Vec<Arc<dyn MetricsSink>> =
            vec![Arc::new(PrometheusSink::new()), Arc::new(PrometheusSink::new())];
        let fanout = FanoutSink::new(sinks);

        let err = fanout
            .register("kafka.consumer.lag", "lag", &tags(2), LagValue::default())
            .unwrap_err();
        assert_eq!(err.key, PartitionKey::new("orders", 2));
    }

    /// Manual reader the test keeps a handle to after the provider owns it.
    #[derive(Debug, Clone)]
    struct SharedReader(Arc<ManualReader>);

    impl TemporalitySelector for SharedReader {
        fn temporality(&self, kind: InstrumentKind) -> Temporality {
            self.0.temporality(kind)
        }
    }

    impl MetricReader for SharedReader {
        fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
            self.0.register_pipeline(pipeline)
        }

        fn collect(&self, rm: &mut ResourceMetrics) -> opentelemetry::metrics::Result<()> {
            self.0.collect(rm)
        }

        fn force_flush(&self) -> opentelemetry::metrics::Result<()> {
            self.0.force_flush()
        }

        fn shutdown(&self) -> opentelemetry::metrics::Result<()> {
            self.0.shutdown()
        }
    }

    fn collect_lag(reader: &SharedReader, partition: i32) -> Option<u64> {
        let mut rm = ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: Vec::new(),
        };
        reader.collect(&mut rm).unwrap();

        let wanted = KeyValue::new("partition", partition.to_string());
        rm.scope_metrics
            .iter()
            .flat_map(|scope| &scope.metrics)
            .filter(|metric| metric.name == "kafka_consumer_lag")
            .filter_map(|metric| metric.data.as_any().downcast_ref::<Gauge<u64>>())
            .flat_map(|gauge| &gauge.data_points)
            .find(|point| point.attributes.contains(&wanted))
            .map(|point| point.value)
    }

    #[test]
    fn test_otel_sink_reports_current_value() {
        let reader = SharedReader(Arc::new(ManualReader::builder().build()));
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let sink = OtelSink::new(lag_meter(&provider));

        let value = LagValue::new(20);
        sink.register("kafka_consumer_lag", "lag", &tags(0), value.clone())
            .unwrap();
        sink.register("kafka_consumer_lag", "lag", &tags(1), LagValue::new(2))
            .unwrap();

        assert_eq!(collect_lag(&reader, 0), Some(20));
        assert_eq!(collect_lag(&reader, 1), Some(2));

        value.set(4);
        assert_eq!(collect_lag(&reader, 0), Some(4));
    }
}
