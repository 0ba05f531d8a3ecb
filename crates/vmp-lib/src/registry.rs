//! Model registry
//!
//! Fixed, ordered set of model families with their default hyperparameters
//! and search grids. Registry order breaks ties when picking the best model.

use crate::error::{PlacementError, Result};
use crate::estimators::{
    DecisionTree, Estimator, ForestParams, GradientBoosting, GradientBoostingParams, Knn,
    KnnParams, Mlp, MlpParams, ParamValue, RandomForest, Svr, SvrParams, TreeParams, XgbParams,
    XgbRegressor,
};
use crate::models::ModelMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RANDOM_FOREST: &str = "Random Forest";
pub const GRADIENT_BOOSTING: &str = "Gradient Boosting";
pub const XGBOOST: &str = "XGBoost";
pub const KNN: &str = "K-Nearest Neighbors";
pub const SVR: &str = "Support Vector Regression";
pub const DECISION_TREE: &str = "Decision Tree";
pub const NEURAL_NETWORK: &str = "Neural Network";

/// Ordered hyperparameter search space
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        self.axes.push((name.into(), values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty() || self.axes.iter().any(|(_, v)| v.is_empty())
    }

    /// Number of combinations in the full cartesian product
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    /// Cartesian product, last axis varying fastest
    pub fn combinations(&self) -> Vec<BTreeMap<String, ParamValue>> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut out = vec![BTreeMap::new()];
        for (name, values) in &self.axes {
            out = out
                .into_iter()
                .flat_map(|partial| {
                    values.iter().map(move |v| {
                        let mut combo = partial.clone();
                        combo.insert(name.clone(), v.clone());
                        combo
                    })
                })
                .collect();
        }
        out
    }
}

/// Registered model family with its defaults and grid
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub estimator: Estimator,
    pub grid: ParamGrid,
    /// Trained and evaluated on standardized features
    pub scaled: bool,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, estimator: Estimator, grid: ParamGrid, scaled: bool) -> Self {
        Self {
            name: name.into(),
            estimator,
            grid,
            scaled,
        }
    }

    /// Untrained entry carrying the default estimator
    pub fn entry(&self) -> ModelEntry {
        ModelEntry {
            name: self.name.clone(),
            kind: self.estimator.family().to_string(),
            hyperparameters: self.estimator.params(),
            estimator: self.estimator.unfitted(),
            scaled: self.scaled,
            trained: false,
            metrics: None,
        }
    }
}

/// A model as held by a training run or a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub kind: String,
    pub hyperparameters: BTreeMap<String, ParamValue>,
    pub estimator: Estimator,
    pub scaled: bool,
    pub trained: bool,
    pub metrics: Option<ModelMetrics>,
}

impl ModelEntry {
    pub fn trained(name: &str, estimator: Estimator, scaled: bool, metrics: ModelMetrics) -> Self {
        Self {
            name: name.to_string(),
            kind: estimator.family().to_string(),
            hyperparameters: estimator.params(),
            estimator,
            scaled,
            trained: true,
            metrics: Some(metrics),
        }
    }
}

/// Ordered collection of model specs
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    specs: Vec<ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(42, 1000)
    }
}

fn ints(values: &[usize]) -> Vec<ParamValue> {
    values.iter().map(|&v| ParamValue::Int(v)).collect()
}

fn floats(values: &[f64]) -> Vec<ParamValue> {
    values.iter().map(|&v| ParamValue::Float(v)).collect()
}

fn boosting_grid() -> ParamGrid {
    ParamGrid::new()
        .axis("n_estimators", ints(&[50, 100, 200]))
        .axis("learning_rate", floats(&[0.01, 0.1, 0.2]))
        .axis("max_depth", ints(&[3, 5, 7]))
}

impl ModelRegistry {
    /// The seven default models, all seeded with `seed`
    pub fn new(seed: u64, svr_max_train_samples: usize) -> Self {
        let specs = vec![
            ModelSpec::new(
                RANDOM_FOREST,
                Estimator::RandomForest(RandomForest::new(ForestParams {
                    seed,
                    ..Default::default()
                })),
                ParamGrid::new()
                    .axis("n_estimators", ints(&[50, 100, 200]))
                    .axis(
                        "max_depth",
                        vec![ParamValue::Int(10), ParamValue::Int(20), ParamValue::None],
                    )
                    .axis("min_samples_split", ints(&[2, 5, 10])),
                false,
            ),
            ModelSpec::new(
                GRADIENT_BOOSTING,
                Estimator::GradientBoosting(GradientBoosting::new(GradientBoostingParams {
                    seed,
                    ..Default::default()
                })),
                boosting_grid(),
                false,
            ),
            ModelSpec::new(
                XGBOOST,
                Estimator::XGBoost(XgbRegressor::new(XgbParams {
                    seed,
                    ..Default::default()
                })),
                boosting_grid(),
                false,
            ),
            ModelSpec::new(
                KNN,
                Estimator::Knn(Knn::new(KnnParams::default())),
                ParamGrid::new()
                    .axis("n_neighbors", ints(&[3, 5, 7, 9]))
                    .axis(
                        "weights",
                        vec![ParamValue::text("uniform"), ParamValue::text("distance")],
                    ),
                true,
            ),
            ModelSpec::new(
                SVR,
                Estimator::Svr(Svr::new(SvrParams {
                    max_train_samples: svr_max_train_samples,
                    seed,
                    ..Default::default()
                })),
                ParamGrid::new()
                    .axis("C", floats(&[0.1, 1.0, 10.0, 100.0]))
                    .axis(
                        "gamma",
                        vec![
                            ParamValue::text("scale"),
                            ParamValue::text("auto"),
                            ParamValue::Float(0.001),
                            ParamValue::Float(0.01),
                        ],
                    ),
                true,
            ),
            ModelSpec::new(
                DECISION_TREE,
                Estimator::DecisionTree(DecisionTree::new(TreeParams {
                    seed,
                    ..Default::default()
                })),
                ParamGrid::new()
                    .axis(
                        "max_depth",
                        vec![
                            ParamValue::Int(5),
                            ParamValue::Int(10),
                            ParamValue::Int(20),
                            ParamValue::None,
                        ],
                    )
                    .axis("min_samples_split", ints(&[2, 5, 10]))
                    .axis("min_samples_leaf", ints(&[1, 2, 4])),
                false,
            ),
            ModelSpec::new(
                NEURAL_NETWORK,
                Estimator::Mlp(Mlp::new(MlpParams {
                    seed,
                    ..Default::default()
                })),
                ParamGrid::new(),
                true,
            ),
        ];
        Self { specs }
    }

    /// Registry restricted to `names`, keeping registry order
    pub fn only(&self, names: &[&str]) -> Result<Self> {
        if let Some(missing) = names.iter().find(|n| self.get(n).is_none()) {
            return Err(PlacementError::Config(format!("unknown model: {}", missing)));
        }
        Ok(Self {
            specs: self
                .specs
                .iter()
                .filter(|s| names.contains(&s.name.as_str()))
                .cloned()
                .collect(),
        })
    }

    /// Replace the search grid of one model
    pub fn with_grid(mut self, name: &str, grid: ParamGrid) -> Result<Self> {
        let spec = self
            .specs
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| PlacementError::Config(format!("unknown model: {}", name)))?;
        spec.grid = grid;
        Ok(self)
    }

    pub fn specs(&self) -> &[ModelSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_order() {
        let registry = ModelRegistry::default();
        assert_eq!(
            registry.names(),
            vec![
                RANDOM_FOREST,
                GRADIENT_BOOSTING,
                XGBOOST,
                KNN,
                SVR,
                DECISION_TREE,
                NEURAL_NETWORK
            ]
        );
        let scaled: Vec<&str> = registry
            .specs()
            .iter()
            .filter(|s| s.scaled)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(scaled, vec![KNN, SVR, NEURAL_NETWORK]);
    }

    #[test]
    fn test_grid_sizes() {
        let registry = ModelRegistry::default();
        let size = |name: &str| registry.get(name).unwrap().grid.len();
        assert_eq!(size(RANDOM_FOREST), 27);
        assert_eq!(size(GRADIENT_BOOSTING), 27);
        assert_eq!(size(XGBOOST), 27);
        assert_eq!(size(KNN), 8);
        assert_eq!(size(SVR), 16);
        assert_eq!(size(DECISION_TREE), 36);
        assert!(registry.get(NEURAL_NETWORK).unwrap().grid.is_empty());
    }

    #[test]
    fn test_combinations_cover_product() {
        let grid = ParamGrid::new()
            .axis("a", ints(&[1, 2]))
            .axis("b", vec![ParamValue::text("x"), ParamValue::None]);
        let combos = grid.combinations();
        assert_eq!(combos.len(), 4);
        assert_eq!(combos[0]["a"], ParamValue::Int(1));
        assert_eq!(combos[0]["b"], ParamValue::text("x"));
        assert_eq!(combos[1]["b"], ParamValue::None);
        assert_eq!(combos[3]["a"], ParamValue::Int(2));
    }

    #[test]
    fn test_every_grid_combination_applies() {
        let registry = ModelRegistry::default();
        for spec in registry.specs() {
            for combo in spec.grid.combinations() {
                spec.estimator.unfitted().with_params(&combo).unwrap();
            }
        }
    }

    #[test]
    fn test_only_keeps_order_and_rejects_unknown() {
        let registry = ModelRegistry::default();
        let subset = registry.only(&[DECISION_TREE, KNN]).unwrap();
        assert_eq!(subset.names(), vec![KNN, DECISION_TREE]);
        assert!(registry.only(&["Linear Regression"]).is_err());
    }

    #[test]
    fn test_with_grid_override() {
        let registry = ModelRegistry::default()
            .with_grid(KNN, ParamGrid::new())
            .unwrap();
        assert!(registry.get(KNN).unwrap().grid.is_empty());
    }

    #[test]
    fn test_entry_is_untrained() {
        let registry = ModelRegistry::default();
        let entry = registry.get(SVR).unwrap().entry();
        assert!(!entry.trained);
        assert!(entry.metrics.is_none());
        assert_eq!(entry.kind, "svr");
        assert_eq!(entry.hyperparameters["gamma"], ParamValue::text("scale"));
    }
}
