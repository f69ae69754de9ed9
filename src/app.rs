//! Composition root.
//!
//! Builds the broker, gauge registry, metrics sinks and interceptor once,
//! then runs one consumer task per partition, the producer, and the scrape
//! server until shutdown.

use anyhow::Context;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;

use crate::broker::InMemoryBroker;
use crate::config::Config;
use crate::consumer::{LoggingHandler, MessageHandler, PartitionConsumer};
use crate::intercept::LagInterceptor;
use crate::lag::LagCalculator;
use crate::observability::metrics::{
    build_meter_provider, lag_meter, FanoutSink, MetricsSink, OtelSink, PrometheusSink,
};
use crate::observability::prometheus::{run_scrape_server, ScrapeState};
use crate::partition::PartitionKey;
use crate::producer::Producer;
use crate::registry::GaugeRegistry;

/// Everything the runtime shares between tasks.
pub struct App {
    config: Config,
    broker: Arc<InMemoryBroker>,
    registry: Arc<GaugeRegistry>,
    prometheus: PrometheusSink,
    meter_provider: Option<SdkMeterProvider>,
    interceptor: LagInterceptor,
    handler: Arc<dyn MessageHandler>,
}

impl App {
    /// Wire up the runtime from configuration.
    ///
    /// Must be called inside a tokio runtime when an OTLP endpoint is set.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let broker = Arc::new(InMemoryBroker::new(config.notify_channel_size));
        broker
            .create_topic(&config.topic, config.partitions)
            .context("failed to create topic")?;

        let prometheus = PrometheusSink::new();
        let mut meter_provider = None;
        let sink: Arc<dyn MetricsSink> = match &config.otel_endpoint {
            Some(endpoint) => {
                let provider = build_meter_provider(Some(endpoint));
                let otel = OtelSink::new(lag_meter(&provider));
                meter_provider = Some(provider);
                let sinks: Vec<Arc<dyn MetricsSink>> =
                    vec![Arc::new(prometheus.clone()), Arc::new(otel)];
                Arc::new(FanoutSink::new(sinks))
            }
            None => Arc::new(prometheus.clone()),
        };

        let registry = Arc::new(GaugeRegistry::with_metric_name(
            sink,
            config.metric_name.clone(),
        ));

        let calculator = match config.broker_timeout() {
            Some(timeout) => LagCalculator::with_timeout(timeout),
            None => LagCalculator::new(),
        };
        let interceptor = LagInterceptor::new(registry.clone(), calculator);
        let handler = Arc::new(LoggingHandler::new(config.processing_delay()));

        Ok(Self {
            config,
            broker,
            registry,
            prometheus,
            meter_provider,
            interceptor,
            handler,
        })
    }

    /// Replace the business handler run for every record.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.broker
    }

    pub fn registry(&self) -> &Arc<GaugeRegistry> {
        &self.registry
    }

    /// Run every task until `shutdown_rx` fires, then wait for them to stop.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        let tracker = TaskTracker::new();

        for partition in 0..self.config.partitions {
            let key = PartitionKey::new(self.config.topic.clone(), partition as i32);
            let consumer = PartitionConsumer::new(
                self.broker.clone(),
                key,
                self.config.group_id.clone(),
                self.interceptor.clone(),
                self.handler.clone(),
            );
            tracker.spawn(consumer.run(shutdown_rx.clone()));
        }

        if let Some(interval) = self.config.produce_interval() {
            let producer = Producer::new(self.broker.clone(), self.config.topic.clone(), interval);
            tracker.spawn(producer.run(shutdown_rx.clone()));
        }

        if self.config.metrics_enabled {
            let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.metrics_port)
                .parse()
                .context("invalid metrics address")?;
            let state = ScrapeState::new(self.prometheus.registry().clone(), self.registry.clone());
            let metrics_shutdown_rx = shutdown_rx.clone();

            tracker.spawn(async move {
                if let Err(e) = run_scrape_server(addr, state, metrics_shutdown_rx).await {
                    tracing::error!(error = %e, "Metrics server error");
                }
            });
        }

        tracing::info!(
            topic = %self.config.topic,
            partitions = self.config.partitions,
            group_id = %self.config.group_id,
            "Lagmeter running"
        );

        // Wait for shutdown signal
        let _ = shutdown_rx.changed().await;
        tracing::info!("Shutdown signal received, stopping tasks");

        tracker.close();
        tracker.wait().await;

        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Failed to shut down meter provider");
            }
        }

        tracing::info!(gauges = self.registry.len(), "Lagmeter stopped");
        Ok(())
    }
}

/// Build and run the runtime.
pub async fn run(config: Config, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
    App::build(config)?.run(shutdown_rx).await
}
