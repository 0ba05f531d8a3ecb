//! Cross-validated grid search

use super::data::PreparedData;
use super::metrics::regression_metrics;
use super::split::k_fold;
use super::train::evaluate;
use crate::error::{PlacementError, Result};
use crate::estimators::{Estimator, ParamValue, Regressor};
use crate::models::ModelMetrics;
use crate::registry::{ModelEntry, ModelRegistry, ModelSpec};
use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const DEFAULT_CV_FOLDS: usize = 3;
pub const DEFAULT_MAX_COMBINATIONS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct TuningConfig {
    pub cv_folds: usize,
    /// Grids larger than this are truncated
    pub max_combinations: usize,
    pub seed: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            cv_folds: DEFAULT_CV_FOLDS,
            max_combinations: DEFAULT_MAX_COMBINATIONS,
            seed: 42,
        }
    }
}

impl TuningConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cv_folds < 2 {
            return Err(PlacementError::Config("cv_folds must be at least 2".into()));
        }
        if self.max_combinations == 0 {
            return Err(PlacementError::Config("max_combinations must be at least 1".into()));
        }
        Ok(())
    }
}

/// Search outcome for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTuning {
    pub best_params: BTreeMap<String, ParamValue>,
    pub best_cv_score: f64,
    pub combinations_evaluated: usize,
    pub combinations_failed: usize,
    pub truncated: bool,
    pub metrics: ModelMetrics,
}

/// Outcome of a tuning run
#[derive(Debug, Clone)]
pub struct TuningReport {
    /// Updated entries, in the order they were given
    pub entries: Vec<ModelEntry>,
    pub tuned: BTreeMap<String, ModelTuning>,
    /// Models left unchanged because they have no grid
    pub skipped: Vec<String>,
    pub failures: BTreeMap<String, String>,
}

fn cv_score(
    candidate: &Estimator,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    folds: &[(Vec<usize>, Vec<usize>)],
) -> Result<f64> {
    let mut total = 0.0;
    for (train, validation) in folds {
        let mut model = candidate.unfitted();
        model.fit(
            x.select(Axis(0), train).view(),
            y.select(Axis(0), train).view(),
        )?;
        let pred = model.predict(x.select(Axis(0), validation).view())?;
        let r2 = regression_metrics(y.select(Axis(0), validation).view(), pred.view()).r2;
        if !r2.is_finite() {
            return Err(PlacementError::fit(candidate.family(), "non-finite validation score"));
        }
        total += r2;
    }
    Ok(total / folds.len() as f64)
}

fn tune_model(
    spec: &ModelSpec,
    data: &PreparedData,
    config: &TuningConfig,
) -> Result<(ModelEntry, ModelTuning)> {
    let mut combos = spec.grid.combinations();
    let truncated = combos.len() > config.max_combinations;
    if truncated {
        warn!(
            model = %spec.name,
            total = combos.len(),
            limit = config.max_combinations,
            "Parameter grid truncated"
        );
        combos.truncate(config.max_combinations);
    }

    let (x, y) = data.train(spec.scaled);
    let folds = k_fold(x.nrows(), config.cv_folds, config.seed)?;

    let scored: Vec<(usize, Option<f64>)> = combos
        .par_iter()
        .enumerate()
        .map(|(i, combo)| {
            let outcome = spec
                .estimator
                .unfitted()
                .with_params(combo)
                .and_then(|candidate| cv_score(&candidate, x, y, &folds));
            match outcome {
                Ok(score) => (i, Some(score)),
                Err(e) => {
                    warn!(model = %spec.name, params = ?combo, error = %e, "Combination skipped");
                    (i, None)
                }
            }
        })
        .collect();

    let failed = scored.iter().filter(|(_, s)| s.is_none()).count();
    let best = scored
        .iter()
        .filter_map(|&(i, s)| s.map(|s| (i, s)))
        .fold(None::<(usize, f64)>, |best, (i, s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((i, s)),
        });
    let Some((best_idx, best_score)) = best else {
        return Err(PlacementError::fit(&spec.name, "every parameter combination failed"));
    };

    let best_params = combos[best_idx].clone();
    let mut estimator = spec.estimator.unfitted().with_params(&best_params)?;
    estimator.fit(x, y)?;
    let entry = evaluate(&spec.name, estimator, spec.scaled, data)?;
    let metrics = entry.metrics.unwrap_or(ModelMetrics {
        mse: f64::NAN,
        r2: f64::NAN,
        mae: f64::NAN,
    });

    info!(
        model = %spec.name,
        cv_r2 = best_score,
        test_r2 = metrics.r2,
        evaluated = combos.len(),
        failed,
        "Model tuned"
    );

    Ok((
        entry,
        ModelTuning {
            best_params,
            best_cv_score: best_score,
            combinations_evaluated: combos.len(),
            combinations_failed: failed,
            truncated,
            metrics,
        },
    ))
}

/// Grid-search every model of `current` that has a grid in `registry`
///
/// Models without a grid, or whose search fails entirely, keep their
/// current entry and metrics.
pub fn tune_hyperparameters(
    registry: &ModelRegistry,
    current: &[ModelEntry],
    data: &PreparedData,
    config: &TuningConfig,
) -> Result<TuningReport> {
    config.validate()?;

    let mut entries = Vec::with_capacity(current.len());
    let mut tuned = BTreeMap::new();
    let mut skipped = Vec::new();
    let mut failures = BTreeMap::new();

    for entry in current {
        let Some(spec) = registry.get(&entry.name).filter(|s| !s.grid.is_empty()) else {
            skipped.push(entry.name.clone());
            entries.push(entry.clone());
            continue;
        };
        match tune_model(spec, data, config) {
            Ok((updated, outcome)) => {
                tuned.insert(entry.name.clone(), outcome);
                entries.push(updated);
            }
            Err(e) => {
                warn!(model = %entry.name, error = %e, "Tuning failed, keeping current model");
                failures.insert(entry.name.clone(), e.to_string());
                entries.push(entry.clone());
            }
        }
    }

    Ok(TuningReport {
        entries,
        tuned,
        skipped,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::generate;
    use crate::estimators::{DecisionTree, TreeParams};
    use crate::registry::{ParamGrid, DECISION_TREE, KNN, NEURAL_NETWORK};
    use crate::trainer::train_all;

    fn data() -> PreparedData {
        PreparedData::prepare(&generate(150, 42), 0.2, 42).unwrap()
    }

    #[test]
    fn test_tuning_updates_models_with_grids() {
        let data = data();
        let registry = ModelRegistry::default().only(&[KNN, DECISION_TREE]).unwrap();
        let report = train_all(&registry, &data);
        let tuning = tune_hyperparameters(&registry, &report.entries, &data, &TuningConfig::default()).unwrap();

        assert_eq!(tuning.tuned.len(), 2);
        assert!(tuning.failures.is_empty());
        let knn = &tuning.tuned[KNN];
        assert_eq!(knn.combinations_evaluated, 8);
        assert!(!knn.truncated);
        assert!(knn.best_params.contains_key("n_neighbors"));
        let entry = tuning.entries.iter().find(|e| e.name == KNN).unwrap();
        assert!(entry.trained);
        assert_eq!(entry.metrics, Some(knn.metrics));
    }

    #[test]
    fn test_empty_grid_leaves_entry_unchanged() {
        let data = data();
        let registry = ModelRegistry::default()
            .only(&[DECISION_TREE])
            .unwrap()
            .with_grid(DECISION_TREE, ParamGrid::new())
            .unwrap();
        let report = train_all(&registry, &data);
        let tuning = tune_hyperparameters(&registry, &report.entries, &data, &TuningConfig::default()).unwrap();
        assert_eq!(tuning.skipped, vec![DECISION_TREE.to_string()]);
        assert_eq!(tuning.entries, report.entries);
    }

    #[test]
    fn test_network_has_no_grid() {
        let registry = ModelRegistry::default();
        assert!(registry.get(NEURAL_NETWORK).unwrap().grid.is_empty());
    }

    #[test]
    fn test_grid_is_truncated() {
        let data = data();
        let registry = ModelRegistry::default().only(&[DECISION_TREE]).unwrap();
        let report = train_all(&registry, &data);
        let config = TuningConfig {
            max_combinations: 4,
            ..Default::default()
        };
        let tuning = tune_hyperparameters(&registry, &report.entries, &data, &config).unwrap();
        let outcome = &tuning.tuned[DECISION_TREE];
        assert!(outcome.truncated);
        assert_eq!(outcome.combinations_evaluated, 4);
    }

    #[test]
    fn test_failing_combinations_are_skipped() {
        let data = data();
        let grid = ParamGrid::new().axis(
            "min_samples_split",
            vec![ParamValue::Int(0), ParamValue::Int(4)],
        );
        let registry = ModelRegistry::default()
            .only(&[DECISION_TREE])
            .unwrap()
            .with_grid(DECISION_TREE, grid)
            .unwrap();
        let report = train_all(&registry, &data);
        let tuning = tune_hyperparameters(&registry, &report.entries, &data, &TuningConfig::default()).unwrap();
        let outcome = &tuning.tuned[DECISION_TREE];
        assert_eq!(outcome.combinations_failed, 1);
        assert_eq!(outcome.best_params["min_samples_split"], ParamValue::Int(4));
    }

    #[test]
    fn test_all_combinations_failing_keeps_entry() {
        let data = data();
        let grid = ParamGrid::new().axis("max_depth", vec![ParamValue::Int(0)]);
        let registry = ModelRegistry::default()
            .only(&[DECISION_TREE])
            .unwrap()
            .with_grid(DECISION_TREE, grid)
            .unwrap();
        let current = vec![ModelEntry::trained(
            DECISION_TREE,
            Estimator::DecisionTree(DecisionTree::new(TreeParams::default())),
            false,
            ModelMetrics {
                mse: 0.5,
                r2: 0.5,
                mae: 0.5,
            },
        )];
        let tuning = tune_hyperparameters(&registry, &current, &data, &TuningConfig::default()).unwrap();
        assert!(tuning.failures.contains_key(DECISION_TREE));
        assert_eq!(tuning.entries, current);
    }
}
