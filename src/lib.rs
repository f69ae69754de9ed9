//! Lagmeter: per-partition consumer lag gauges for message broker consumers.
//!
//! Every time a consumer finishes processing a record, lagmeter asks the
//! broker for the partition's end offset, computes how far behind the
//! consumer is, and keeps a live gauge per (topic, partition) that a metrics
//! backend can read at any time.
//!
//! # Architecture
//!
//! - **Explicit interception**: handlers are wrapped by [`LagInterceptor`] at
//!   the call site; the handler's result is never altered
//! - **Exactly-once registration**: [`GaugeRegistry`] creates and registers
//!   one gauge per partition, even under concurrent first sight
//! - **Pluggable backends**: Prometheus and OpenTelemetry sinks read gauge
//!   values on demand
//!
//! # Modules
//!
//! - [`app`]: Composition root for the demo runtime
//! - [`broker`]: Offset client trait and in-memory broker
//! - [`config`]: CLI and environment configuration
//! - [`consumer`]: Per-partition consumer tasks
//! - [`error`]: Error taxonomy for lag recording
//! - [`event`]: Consumption events supplied per handler invocation
//! - [`intercept`]: Handler decorator that records lag
//! - [`lag`]: Lag arithmetic and end-offset measurement
//! - [`observability`]: Metrics sinks, scrape endpoint and tracing setup
//! - [`partition`]: Partition keys and gauge tags
//! - [`producer`]: Synthetic message producer
//! - [`registry`]: Gauge registry

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // registry::GaugeRegistry is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::similar_names,              // offset/offsets are fine
    clippy::struct_excessive_bools,     // Config structs may have flags
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod app;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod intercept;
pub mod lag;
pub mod observability;
pub mod partition;
pub mod producer;
pub mod registry;

pub use broker::OffsetClient;
pub use error::{BrokerQueryError, MissingMetadata, RecordError, RegistrationError};
pub use event::ConsumptionEvent;
pub use intercept::LagInterceptor;
pub use lag::{compute_lag, LagCalculator};
pub use observability::metrics::MetricsSink;
pub use partition::{LagTags, PartitionKey};
pub use registry::{GaugeRegistry, LagValue};

/// Default metric name for the lag gauge.
pub const DEFAULT_METRIC_NAME: &str = "kafka_consumer_lag";

/// Description attached to every lag gauge.
pub const METRIC_DESCRIPTION: &str = "The current estimated lag of a Kafka consumer group";
