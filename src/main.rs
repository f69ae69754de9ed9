//! Lagmeter: per-partition consumer lag gauges.
//!
//! # Usage
//!
//! ```bash
//! lagmeter --topic TestTopic --partitions 3 --metrics-port 9090
//! ```
//!
//! Environment variables can also be used:
//! - `LAGMETER_TOPIC`: Topic to consume
//! - `LAGMETER_METRICS_PORT`: Port for the scrape endpoint
//! - `RUST_LOG`: Log filter (overrides `--log-level`)

use lagmeter::config::Config;
use lagmeter::observability::tracing::init_tracing;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  Lagmeter v{} - Consumer Lag Gauges

  Configuration:
    Topic:       {} ({} partitions)
    Group:       {}
    Metrics:     {}
    Log Level:   {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.topic,
        config.partitions,
        config.group_id,
        if config.metrics_enabled {
            format!("http://{}:{}/metrics", config.host, config.metrics_port)
        } else {
            "disabled".to_string()
        },
        config.log_level
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level, config.log_format);

    print_banner(&config);

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler task
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating shutdown...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = ctrl_c.await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        let _ = shutdown_tx.send(true);
    });

    lagmeter::app::run(config, shutdown_rx).await?;

    tracing::info!("Lagmeter shutdown complete");
    Ok(())
}
