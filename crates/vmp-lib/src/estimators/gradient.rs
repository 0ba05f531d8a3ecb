//! Gradient boosting backed by the `gbdt` crate
//!
//! Trees are fit on squared loss with full row and feature sampling, so a
//! fit is deterministic. `gbdt` works in `f32` and keeps no split
//! statistics, so importances are permutation importances measured on the
//! training rows once the model is fit.

use super::params::{as_f64, as_usize, unknown_param, ParamValue};
use super::tree::normalize;
use super::{check_fit_input, check_predict_input, Regressor};
use crate::error::{PlacementError, Result};
use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

const LOSS: &str = "SquaredError";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Seeds the column shuffles of the permutation importances
    pub seed: u64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl GradientBoostingParams {
    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PlacementError::Config("n_estimators must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PlacementError::Config("learning_rate must be positive".into()));
        }
        if self.max_depth == 0 {
            return Err(PlacementError::Config("max_depth must be at least 1".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(PlacementError::Config("min_samples_leaf must be at least 1".into()));
        }
        Ok(())
    }

    fn config(&self, n_features: usize) -> Config {
        let mut config = Config::new();
        config.set_feature_size(n_features);
        config.set_shrinkage(self.learning_rate as f32);
        config.set_max_depth(self.max_depth as u32);
        config.set_iterations(self.n_estimators);
        config.set_min_leaf_size(self.min_samples_leaf);
        config.set_data_sample_ratio(1.0);
        config.set_feature_sample_ratio(1.0);
        config.set_training_optimization_level(2);
        config.set_debug(false);
        config.set_loss(LOSS);
        config
    }
}

/// Fitted `gbdt` model, shared between snapshot clones
#[derive(Clone)]
struct FittedGbdt {
    model: Arc<GBDT>,
    n_features: usize,
}

impl FittedGbdt {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let rows: DataVec = x
            .axis_iter(Axis(0))
            .map(|row| Data::new_test_data(row.iter().map(|&v| v as f32).collect(), None))
            .collect();
        self.model.predict(&rows).into_iter().map(f64::from).collect()
    }
}

impl fmt::Debug for FittedGbdt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FittedGbdt")
            .field("n_features", &self.n_features)
            .finish_non_exhaustive()
    }
}

impl PartialEq for FittedGbdt {
    fn eq(&self, other: &Self) -> bool {
        self.n_features == other.n_features
            && (Arc::ptr_eq(&self.model, &other.model)
                || serde_json::to_value(self.model.as_ref()).ok()
                    == serde_json::to_value(other.model.as_ref()).ok())
    }
}

#[derive(Serialize, Deserialize)]
struct FittedGbdtRepr<M> {
    n_features: usize,
    model: M,
}

impl Serialize for FittedGbdt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        FittedGbdtRepr {
            n_features: self.n_features,
            model: self.model.as_ref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FittedGbdt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = FittedGbdtRepr::<GBDT>::deserialize(deserializer)?;
        Ok(Self {
            model: Arc::new(repr.model),
            n_features: repr.n_features,
        })
    }
}

/// Gradient boosted regression trees on squared loss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub params: GradientBoostingParams,
    fitted: Option<FittedGbdt>,
    importances: Option<Vec<f64>>,
}

impl GradientBoosting {
    pub fn new(params: GradientBoostingParams) -> Self {
        Self {
            params,
            fitted: None,
            importances: None,
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_estimators" => self.params.n_estimators = as_usize(name, value)?,
            "learning_rate" => self.params.learning_rate = as_f64(name, value)?,
            "max_depth" => self.params.max_depth = as_usize(name, value)?,
            "min_samples_leaf" => self.params.min_samples_leaf = as_usize(name, value)?,
            "seed" => self.params.seed = as_usize(name, value)? as u64,
            _ => return Err(unknown_param("Gradient Boosting", name)),
        }
        Ok(())
    }

    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("n_estimators".to_string(), ParamValue::Int(self.params.n_estimators)),
            ("learning_rate".to_string(), ParamValue::Float(self.params.learning_rate)),
            ("max_depth".to_string(), ParamValue::Int(self.params.max_depth)),
        ])
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

fn mse(a: &Array1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(p, t)| (p - t) * (p - t)).sum::<f64>() / a.len().max(1) as f64
}

/// Error increase when each column is shuffled, normalized to sum to one
fn permutation_importances(
    fitted: &FittedGbdt,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    seed: u64,
) -> Vec<f64> {
    let baseline = mse(&fitted.predict(x), y);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    let mut importances: Vec<f64> = (0..x.ncols())
        .map(|f| {
            order.shuffle(&mut rng);
            let mut shuffled = x.to_owned();
            for (row, &src) in order.iter().enumerate() {
                shuffled[[row, f]] = x[[src, f]];
            }
            (mse(&fitted.predict(shuffled.view()), y) - baseline).max(0.0)
        })
        .collect();
    normalize(&mut importances);
    importances
}

impl Regressor for GradientBoosting {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input("Gradient Boosting", x, y)?;
        self.params.validate()?;

        let mut train: DataVec = x
            .axis_iter(Axis(0))
            .zip(y.iter())
            .map(|(row, &target)| {
                let features = row.iter().map(|&v| v as f32).collect();
                Data::new_training_data(features, 1.0, target as f32, None)
            })
            .collect();

        let mut model = GBDT::new(&self.params.config(x.ncols()));
        model.fit(&mut train);

        let fitted = FittedGbdt {
            model: Arc::new(model),
            n_features: x.ncols(),
        };
        self.importances = Some(permutation_importances(&fitted, x, y, self.params.seed));
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or(PlacementError::NotTrained)?;
        check_predict_input(fitted.n_features, x)?;
        Ok(fitted.predict(x))
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.importances.clone()
    }
}
