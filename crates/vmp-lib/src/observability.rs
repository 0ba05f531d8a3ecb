//! Prometheus metrics and structured event logging for the placement service

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Prediction latency buckets (seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Training run buckets (seconds)
const TRAINING_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0];

static GLOBAL_METRICS: OnceLock<PlacementMetricsInner> = OnceLock::new();

struct PlacementMetricsInner {
    training_duration_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    models_trained: IntGauge,
    fit_failures: IntCounterVec,
    predictions_generated: IntCounter,
    prediction_errors: IntCounter,
    snapshot_version: IntGauge,
    best_model_info: GaugeVec,
}

impl PlacementMetricsInner {
    fn new() -> Self {
        Self {
            training_duration_seconds: register_histogram!(
                "vmp_training_duration_seconds",
                "Wall time of training and tuning runs",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            prediction_latency_seconds: register_histogram!(
                "vmp_prediction_latency_seconds",
                "Time spent running all models for one placement request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            models_trained: register_int_gauge!(
                "vmp_models_trained",
                "Number of trained models in the current snapshot"
            )
            .expect("Failed to register models_trained"),

            fit_failures: register_int_counter_vec!(
                "vmp_fit_failures_total",
                "Models that failed to fit, by model name",
                &["model"]
            )
            .expect("Failed to register fit_failures"),

            predictions_generated: register_int_counter!(
                "vmp_predictions_generated_total",
                "Total number of placement predictions served"
            )
            .expect("Failed to register predictions_generated"),

            prediction_errors: register_int_counter!(
                "vmp_prediction_errors_total",
                "Total number of failed placement predictions"
            )
            .expect("Failed to register prediction_errors"),

            snapshot_version: register_int_gauge!(
                "vmp_snapshot_version",
                "Version of the snapshot serving predictions"
            )
            .expect("Failed to register snapshot_version"),

            best_model_info: register_gauge_vec!(
                "vmp_best_model_r2",
                "Test R2 of the model currently selected as best",
                &["model"]
            )
            .expect("Failed to register best_model_info"),
        }
    }
}

/// Handle to the process-wide placement metrics
///
/// Clones share the same underlying collectors.
#[derive(Clone, Default)]
pub struct PlacementMetrics {
    _private: (),
}

impl PlacementMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PlacementMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PlacementMetricsInner {
        GLOBAL_METRICS.get_or_init(PlacementMetricsInner::new)
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn set_models_trained(&self, count: usize) {
        self.inner().models_trained.set(count as i64);
    }

    pub fn inc_fit_failures(&self, model: &str) {
        self.inner().fit_failures.with_label_values(&[model]).inc();
    }

    pub fn inc_predictions_generated(&self) {
        self.inner().predictions_generated.inc();
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    /// Record a newly installed snapshot and its best model
    pub fn set_snapshot(&self, version: u64, best_model: Option<&str>, r2: f64) {
        let inner = self.inner();
        inner.snapshot_version.set(version as i64);
        inner.best_model_info.reset();
        if let Some(model) = best_model {
            inner.best_model_info.with_label_values(&[model]).set(r2);
        }
    }
}

/// Event-style log records for significant service events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "service_started",
            instance = %self.instance,
            service_version = %version,
            port = port,
            "Placement service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Placement service shutting down"
        );
    }

    pub fn log_dataset_loaded(&self, source: &str, rows: usize) {
        info!(
            event = "dataset_loaded",
            instance = %self.instance,
            source = %source,
            rows = rows,
            "Dataset ready for training"
        );
    }

    pub fn log_training_completed(
        &self,
        run: &str,
        models_trained: usize,
        failures: usize,
        best_model: Option<&str>,
        duration_secs: f64,
    ) {
        if failures > 0 {
            warn!(
                event = "training_completed",
                instance = %self.instance,
                run = %run,
                models_trained = models_trained,
                failures = failures,
                best_model = ?best_model,
                duration_secs = duration_secs,
                "Training run completed with failures"
            );
        } else {
            info!(
                event = "training_completed",
                instance = %self.instance,
                run = %run,
                models_trained = models_trained,
                best_model = ?best_model,
                duration_secs = duration_secs,
                "Training run completed"
            );
        }
    }

    pub fn log_snapshot_published(&self, version: u64, persisted: bool) {
        info!(
            event = "snapshot_published",
            instance = %self.instance,
            version = version,
            persisted = persisted,
            "Model snapshot published"
        );
    }

    pub fn log_snapshot_restored(&self, version: u64) {
        info!(
            event = "snapshot_restored",
            instance = %self.instance,
            version = version,
            "Model snapshot restored from disk"
        );
    }

    pub fn log_prediction(
        &self,
        vm: &str,
        recommended_host: &str,
        best_model: &str,
        confidence: f64,
        unknown_vm: bool,
        snapshot_version: u64,
    ) {
        info!(
            event = "prediction_generated",
            instance = %self.instance,
            vm = %vm,
            recommended_host = %recommended_host,
            best_model = %best_model,
            confidence = confidence,
            unknown_vm = unknown_vm,
            snapshot_version = snapshot_version,
            "Generated placement prediction"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_collectors() {
        let metrics = PlacementMetrics::new();
        let other = metrics.clone();
        metrics.observe_training_duration(1.5);
        metrics.observe_prediction_latency(0.002);
        metrics.set_models_trained(7);
        metrics.inc_fit_failures("K-Nearest Neighbors");
        other.inc_predictions_generated();
        other.inc_prediction_errors();
        other.set_snapshot(3, Some("Random Forest"), 0.93);

        let families = prometheus::gather();
        assert!(families.iter().any(|f| f.get_name() == "vmp_snapshot_version"));
        assert!(families.iter().any(|f| f.get_name() == "vmp_best_model_r2"));
    }

    #[test]
    fn test_structured_logger_instance() {
        let logger = StructuredLogger::new("vmp-test");
        assert_eq!(logger.instance, "vmp-test");
        logger.log_snapshot_published(1, false);
    }
}
