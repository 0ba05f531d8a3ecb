//! Fit and evaluate every registered model

use super::data::PreparedData;
use super::metrics::regression_metrics;
use crate::error::{PlacementError, Result};
use crate::estimators::{Estimator, Regressor};
use crate::models::ModelMetrics;
use crate::registry::{ModelEntry, ModelRegistry, ModelSpec};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// One entry per registered model, in registry order
    pub entries: Vec<ModelEntry>,
    /// Model name to failure reason
    pub failures: BTreeMap<String, String>,
    pub duration_secs: f64,
}

/// Per-model result as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub models_trained: usize,
    pub results: BTreeMap<String, ModelMetrics>,
    pub failures: BTreeMap<String, String>,
}

impl TrainingReport {
    pub fn trained_count(&self) -> usize {
        self.entries.iter().filter(|e| e.trained).count()
    }

    pub fn results(&self) -> BTreeMap<String, ModelMetrics> {
        collect_results(&self.entries)
    }

    pub fn summary(&self) -> TrainingSummary {
        TrainingSummary {
            models_trained: self.trained_count(),
            results: self.results(),
            failures: self.failures.clone(),
        }
    }
}

/// Metrics of every trained entry, keyed by model name
pub fn collect_results(entries: &[ModelEntry]) -> BTreeMap<String, ModelMetrics> {
    entries
        .iter()
        .filter_map(|e| e.metrics.map(|m| (e.name.clone(), m)))
        .collect()
}

/// Name of the entry with the highest finite R²; earlier entries win ties
pub fn best_model(entries: &[ModelEntry]) -> Option<&str> {
    let mut best: Option<(&str, f64)> = None;
    for entry in entries.iter().filter(|e| e.trained) {
        let Some(r2) = entry.metrics.map(|m| m.r2).filter(|r| r.is_finite()) else {
            continue;
        };
        if best.map_or(true, |(_, b)| r2 > b) {
            best = Some((entry.name.as_str(), r2));
        }
    }
    best.map(|(name, _)| name)
}

/// Fit `spec`'s default estimator on the training rows and score it on the test rows
pub fn fit_and_evaluate(spec: &ModelSpec, data: &PreparedData) -> Result<ModelEntry> {
    let mut estimator = spec.estimator.unfitted();
    let (x_train, y_train) = data.train(spec.scaled);
    estimator.fit(x_train, y_train)?;
    let entry = evaluate(&spec.name, estimator, spec.scaled, data)?;
    Ok(entry)
}

/// Score a fitted estimator on the test rows
pub(crate) fn evaluate(
    name: &str,
    estimator: Estimator,
    scaled: bool,
    data: &PreparedData,
) -> Result<ModelEntry> {
    let (x_test, y_test) = data.test(scaled);
    let pred = estimator.predict(x_test)?;
    if pred.iter().any(|p| !p.is_finite()) {
        return Err(PlacementError::fit(name, "model produced non-finite predictions"));
    }
    let metrics = regression_metrics(y_test, pred.view());
    Ok(ModelEntry::trained(name, estimator, scaled, metrics))
}

/// Train every model of `registry` in parallel
///
/// A model that fails to fit is reported in `failures` and kept as an
/// untrained entry; the remaining models are unaffected.
pub fn train_all(registry: &ModelRegistry, data: &PreparedData) -> TrainingReport {
    let start = Instant::now();
    let outcomes: Vec<(ModelEntry, Option<String>)> = registry
        .specs()
        .par_iter()
        .map(|spec| {
            let model_start = Instant::now();
            match fit_and_evaluate(spec, data) {
                Ok(entry) => {
                    debug!(
                        model = %spec.name,
                        duration_ms = model_start.elapsed().as_millis() as u64,
                        "Model trained"
                    );
                    (entry, None)
                }
                Err(e) => {
                    warn!(model = %spec.name, error = %e, "Model failed to train");
                    (spec.entry(), Some(e.to_string()))
                }
            }
        })
        .collect();

    let mut entries = Vec::with_capacity(outcomes.len());
    let mut failures = BTreeMap::new();
    for (entry, failure) in outcomes {
        if let Some(reason) = failure {
            failures.insert(entry.name.clone(), reason);
        }
        entries.push(entry);
    }

    let report = TrainingReport {
        entries,
        failures,
        duration_secs: start.elapsed().as_secs_f64(),
    };
    info!(
        trained = report.trained_count(),
        failed = report.failures.len(),
        duration_secs = report.duration_secs,
        "Training run finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::generate;
    use crate::estimators::{Knn, KnnParams};
    use crate::registry::{DECISION_TREE, KNN, RANDOM_FOREST};

    fn small_registry() -> ModelRegistry {
        ModelRegistry::default()
            .only(&[RANDOM_FOREST, KNN, DECISION_TREE])
            .unwrap()
    }

    #[test]
    fn test_train_all_scores_every_model() {
        let data = PreparedData::prepare(&generate(300, 42), 0.2, 42).unwrap();
        let report = train_all(&small_registry(), &data);
        assert!(report.failures.is_empty());
        assert_eq!(report.trained_count(), 3);
        for metrics in report.results().values() {
            assert!(metrics.r2.is_finite());
            assert!(metrics.mse >= 0.0);
        }
        // The host rule is a pair of axis-aligned thresholds, which trees recover
        assert!(report.results()[DECISION_TREE].r2 > 0.8);
    }

    #[test]
    fn test_failure_is_isolated() {
        let data = PreparedData::prepare(&generate(3, 42), 0.2, 42).unwrap();
        // k = 5 exceeds the three training rows
        let registry = small_registry();
        let report = train_all(&registry, &data);
        assert!(report.failures.contains_key(KNN));
        assert_eq!(report.trained_count(), 2);
        let knn = report.entries.iter().find(|e| e.name == KNN).unwrap();
        assert!(!knn.trained);
    }

    #[test]
    fn test_train_all_is_deterministic() {
        let data = PreparedData::prepare(&generate(200, 42), 0.2, 42).unwrap();
        let a = train_all(&small_registry(), &data);
        let b = train_all(&small_registry(), &data);
        assert_eq!(a.results(), b.results());
    }

    fn entry(name: &str, r2: f64) -> ModelEntry {
        ModelEntry::trained(
            name,
            Estimator::Knn(Knn::new(KnnParams::default())),
            true,
            ModelMetrics { mse: 0.0, r2, mae: 0.0 },
        )
    }

    #[test]
    fn test_best_model_ties_and_nan() {
        let entries = vec![entry("a", f64::NAN), entry("b", 0.8), entry("c", 0.8)];
        assert_eq!(best_model(&entries), Some("b"));
        assert_eq!(best_model(&[entry("a", f64::NAN)]), None);
        assert_eq!(best_model(&[]), None);
    }
}
