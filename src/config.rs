//! Configuration parsing for the lagmeter runtime.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;
use std::time::Duration;

use crate::observability::tracing::LogFormat;
use crate::DEFAULT_METRIC_NAME;

/// Lagmeter: per-partition consumer lag gauges.
#[derive(Parser, Debug, Clone)]
#[command(name = "lagmeter")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind the metrics server to
    #[arg(long, env = "LAGMETER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the Prometheus scrape endpoint
    #[arg(long, env = "LAGMETER_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Serve /metrics, /lag, /health and /ready
    #[arg(long, env = "LAGMETER_METRICS_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub metrics_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LAGMETER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LAGMETER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// Name of the lag gauge
    #[arg(long, env = "LAGMETER_METRIC_NAME", default_value = DEFAULT_METRIC_NAME)]
    pub metric_name: String,

    /// Consumer group id attached to every gauge
    #[arg(short, long, env = "LAGMETER_GROUP_ID", default_value = "lagmeter-demo")]
    pub group_id: String,

    /// Topic to produce to and consume from
    #[arg(short, long, env = "LAGMETER_TOPIC", default_value = "TestTopic")]
    pub topic: String,

    /// Number of partitions of the topic
    #[arg(short, long, env = "LAGMETER_PARTITIONS", default_value_t = 3)]
    pub partitions: u32,

    /// Milliseconds between produced messages (0 disables the producer)
    #[arg(long, env = "LAGMETER_PRODUCE_INTERVAL_MS", default_value_t = 1000)]
    pub produce_interval_ms: u64,

    /// Simulated processing time per message in milliseconds
    #[arg(long, env = "LAGMETER_PROCESSING_DELAY_MS", default_value_t = 5000)]
    pub processing_delay_ms: u64,

    /// Upper bound on an end-offset query in milliseconds (0 = unbounded)
    #[arg(long, env = "LAGMETER_BROKER_TIMEOUT_MS", default_value_t = 2000)]
    pub broker_timeout_ms: u64,

    /// Size of the broker's new-data notification channel
    #[arg(long, env = "LAGMETER_NOTIFY_CHANNEL_SIZE", default_value_t = 1024)]
    pub notify_channel_size: usize,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Broker query timeout, `None` when unbounded.
    pub fn broker_timeout(&self) -> Option<Duration> {
        (self.broker_timeout_ms > 0).then(|| Duration::from_millis(self.broker_timeout_ms))
    }

    /// Interval between produced messages, `None` when the producer is off.
    pub fn produce_interval(&self) -> Option<Duration> {
        (self.produce_interval_ms > 0).then(|| Duration::from_millis(self.produce_interval_ms))
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    /// Configuration with fast timings and no metrics server.
    pub fn test_config() -> Self {
        Self {
            host: "127.0.0.1".into(),
            metrics_port: 0, // Random port
            metrics_enabled: false,
            log_level: "debug".into(),
            produce_interval_ms: 5,
            processing_delay_ms: 1,
            broker_timeout_ms: 500,
            notify_channel_size: 256,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            metrics_port: 9090,
            metrics_enabled: true,
            log_level: "info".into(),
            log_format: LogFormat::Text,
            otel_endpoint: None,
            metric_name: DEFAULT_METRIC_NAME.into(),
            group_id: "lagmeter-demo".into(),
            topic: "TestTopic".into(),
            partitions: 3,
            produce_interval_ms: 1000,
            processing_delay_ms: 5000,
            broker_timeout_ms: 2000,
            notify_channel_size: 1024,
        }
    }
}
