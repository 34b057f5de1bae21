//! Prometheus metrics for observability and monitoring.
//!
//! The Store, the built-in middleware and the task manager record through the
//! `metrics` facade. Nothing is exported until a recorder is installed; this
//! module installs the Prometheus one and documents every metric it emits:
//!
//! - `store.*`: dispatches, reducer latency, shutdown rejections
//! - `middleware.dispatch.*`: per-kind counts, latency and errors
//! - `lifecycle.run.*`: started, skipped, settled and aborted invocations
//!
//! Prometheus renders dots as underscores, e.g. `store_dispatch_total`.
//!
//! # Example
//!
//! ```rust,no_run
//! use statehub_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // ... run the application ...
//!
//! if let Some(text) = exporter.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use thiserror::Error;

/// Latency buckets, in seconds, for every `*duration_seconds` histogram
const DURATION_BUCKETS: &[f64] = &[
    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0,
];

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

/// Prometheus exporter for statehub metrics.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

// PrometheusHandle has no Debug impl
impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsExporter {
    /// Create an exporter that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Install the Prometheus recorder as the global `metrics` recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        describe_metrics();

        match builder()?.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the exporter hasn't been installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Build a recorder without installing it globally.
///
/// Use with [`metrics::with_local_recorder`] to scope metrics to one
/// component or one test.
///
/// # Errors
///
/// Returns error if the bucket configuration is rejected.
pub fn build_recorder() -> Result<PrometheusRecorder, MetricsError> {
    Ok(builder()?.build_recorder())
}

fn builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), DURATION_BUCKETS)
        .map_err(|e| MetricsError::Build(e.to_string()))
}

/// Register all metric descriptions.
pub fn describe_metrics() {
    // Store
    describe_counter!("store.dispatch.total", "Actions accepted by dispatch");
    describe_counter!(
        "store.dispatch.unchanged",
        "Dispatches where the reducer kept the previous snapshot"
    );
    describe_histogram!("store.reducer.duration_seconds", "Time spent inside the reducer");
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was closed"
    );
    describe_counter!("store.closed", "Stores closed");

    // Middleware
    describe_counter!("middleware.dispatch.total", "Actions seen by the metrics middleware, by kind");
    describe_counter!("middleware.dispatch.errors", "Dispatches that returned an error, by kind");
    describe_counter!("middleware.dispatch.crashes", "Errors caught by the crash reporter");
    describe_histogram!(
        "middleware.dispatch.duration_seconds",
        "Time from entering the metrics middleware to leaving it, by kind"
    );

    // Task lifecycle
    describe_counter!("lifecycle.run.started", "Invocations that dispatched pending");
    describe_counter!("lifecycle.run.skipped", "Invocations skipped by condition or de-duplication");
    describe_counter!("lifecycle.run.fulfilled", "Operations that resolved");
    describe_counter!("lifecycle.run.rejected", "Operations that failed");
    describe_counter!("lifecycle.run.aborted", "Invocations cancelled before settling");
    describe_histogram!(
        "lifecycle.run.duration_seconds",
        "Time from starting an operation to it settling"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::interceptors::MetricsMiddleware;
    use crate::store::Store;
    use statehub_core::{AnyAction, Transition, reducer_fn};

    #[test]
    fn test_exporter_starts_uninstalled() {
        let exporter = MetricsExporter::new();
        assert!(exporter.handle().is_none());
        assert!(exporter.render().is_none());
        assert_eq!(format!("{exporter:?}"), "MetricsExporter { installed: false }");
    }

    #[test]
    fn test_install_tolerates_existing_recorder() {
        let mut exporter = MetricsExporter::new();
        assert!(exporter.install().is_ok());
        // Another install in the same process only warns
        assert!(MetricsExporter::new().install().is_ok());
    }

    #[test]
    fn test_local_recorder_captures_store_metrics() {
        let recorder = build_recorder().unwrap();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            let reducer = reducer_fn(|state: &u32, _action: &AnyAction| Transition::Updated(state + 1));
            let store = Store::builder(0, reducer).middleware(MetricsMiddleware).build();
            store.dispatch(AnyAction::new("count/increment")).unwrap();
        });

        let output = handle.render();
        assert!(output.contains("store_dispatch_total"));
        assert!(output.contains("store_reducer_duration_seconds"));
        assert!(output.contains("count/increment"));
    }
}
