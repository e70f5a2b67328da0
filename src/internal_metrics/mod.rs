//! # Internal Metrics Module
//!
//! Infrastructure for collecting and exposing dispatch metrics.
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder and prepares the
//!   metrics server.
//! - **`Metrics`**: a cloneable handle with one method per recorded event.
//! - **`MetricsServer`**: (defined in `server.rs`) serves `/metrics`.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

/// The public API for the metrics system.
///
/// Without an installed recorder every call is a no-op, so tests can use
/// `Metrics::default()` freely.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    _private: (),
}

impl Metrics {
    /// Registers descriptions for all supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("dispatch_cycles_total", Unit::Count, "Total number of dispatch cycles, labeled by outcome kind.");
        metrics::describe_counter!("notifications_total", Unit::Count, "Total number of notifier invocations, labeled by notifier type and status.");
        metrics::describe_counter!("notifications_suppressed_total", Unit::Count, "Total number of notifications excluded by the suppression policy.");
        metrics::describe_histogram!("notify_duration_seconds", Unit::Seconds, "Time taken by a notifier to deliver or fail.");
        metrics::describe_gauge!("notification_records", Unit::Count, "Number of (rule, notifier) records held by the state tracker.");
        Self { _private: () }
    }

    pub fn increment_cycle(&self, kind: &'static str) {
        metrics::counter!("dispatch_cycles_total", "kind" => kind).increment(1);
    }

    pub fn increment_notification(&self, notifier_type: &str, status: &'static str) {
        metrics::counter!(
            "notifications_total",
            "type" => notifier_type.to_string(),
            "status" => status
        )
        .increment(1);
    }

    pub fn increment_suppressed(&self, notifier_type: &str) {
        metrics::counter!("notifications_suppressed_total", "type" => notifier_type.to_string())
            .increment(1);
    }

    pub fn set_records(&self, count: u64) {
        metrics::gauge!("notification_records").set(count as f64);
    }

    pub fn record_notify_duration(&self, notifier_type: &str, duration: Duration) {
        metrics::histogram!("notify_duration_seconds", "type" => notifier_type.to_string())
            .record(duration.as_secs_f64());
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the Prometheus recorder and returns a `Metrics` handle and the
    /// server to spawn.
    ///
    /// If metrics are disabled, or the recorder cannot be set up, a no-op
    /// `Metrics` is returned without a server.
    pub async fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::default(), None);
        }

        let recorder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                error!(error = %e, "Failed to configure Prometheus recorder");
                return (Metrics::default(), None);
            }
        };
        let handle = recorder.handle();

        let listener = match TcpListener::bind(self.config.listen_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    address = %self.config.listen_address,
                    error = %e,
                    "Failed to bind metrics server"
                );
                return (Metrics::default(), None);
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!(error = %e, "Failed to get local address for metrics server");
                return (Metrics::default(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!(error = %e, "Failed to install Prometheus recorder");
            return (Metrics::default(), None);
        }

        let metrics = Metrics::new();
        let server = MetricsServer::new(listener, handle, shutdown_rx);
        (metrics, Some((server, addr)))
    }
}

pub mod server;
