//! Prometheus metrics for observability.
//!
//! The store records action throughput, reducer latency and effect counts
//! through the `metrics` facade. Nothing is exported unless a recorder is
//! installed; [`MetricsRecorder::install`] installs a Prometheus recorder whose
//! text exposition can be rendered on demand.
//!
//! # Example
//!
//! ```rust,no_run
//! use komiut_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! // ... run stores ...
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// Only one global recorder can exist per process. If one is already
    /// installed (e.g. by another test) the returned recorder has no handle and
    /// [`render`](Self::render) returns `None`.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this recorder did not install the global recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register descriptions for the store metrics.
pub fn register_metrics() {
    describe_counter!("store_actions_total", "Total number of actions reduced by stores");
    describe_counter!(
        "store_rejected_actions_total",
        "Actions rejected because the store was shutting down"
    );
    describe_histogram!(
        "store_reducer_duration_seconds",
        "Time spent inside the reducer per action"
    );
    describe_counter!("store_effects_executed_total", "Effects executed, by kind");
    describe_counter!(
        "store_delays_cancelled_total",
        "Delay effects cancelled by store shutdown"
    );
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record a reduced action.
    pub fn record_action(duration: Duration) {
        counter!("store_actions_total").increment(1);
        histogram!("store_reducer_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an action rejected during shutdown.
    pub fn record_rejected() {
        counter!("store_rejected_actions_total").increment(1);
    }

    /// Record an executed effect.
    pub fn record_effect(kind: &'static str) {
        counter!("store_effects_executed_total", "type" => kind).increment(1);
    }

    /// Record a delay cancelled by shutdown.
    pub fn record_delay_cancelled() {
        counter!("store_delays_cancelled_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_render() {
        let recorder = MetricsRecorder::install();
        assert!(recorder.is_ok());

        StoreMetrics::record_action(Duration::from_micros(40));
        StoreMetrics::record_effect("delay");

        // Another test may have installed the global recorder first
        if let Some(rendered) = recorder.ok().and_then(|r| r.render()) {
            assert!(rendered.contains("store_actions_total"));
            assert!(rendered.contains("store_effects_executed_total"));
        }
    }
}
