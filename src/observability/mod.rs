//! Observability infrastructure.
//!
//! Provides:
//! - Metrics sinks that expose lag gauges (Prometheus, OpenTelemetry)
//! - HTTP endpoints for Prometheus scraping
//! - Structured logging setup

pub mod metrics;
pub mod prometheus;
pub mod tracing;
