//! Regularized boosted trees
//!
//! `XgbRegressor` fits squared loss with trees grown on L2-regularized
//! leaf weights, a minimum split gain and a minimum child weight, as in
//! second-order boosting where every hessian equals one.

use super::params::{as_f64, as_opt_usize, as_usize, unknown_param, ParamValue};
use super::tree::{normalize, RegressionTree, TreeParams};
use super::{check_fit_input, check_predict_input, Regressor};
use crate::error::{PlacementError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fitted additive ensemble of trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ensemble {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl Ensemble {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let mut out = Array1::from_elem(x.nrows(), self.base_score);
        for tree in &self.trees {
            out.scaled_add(self.learning_rate, &tree.predict(x));
        }
        out
    }

    fn n_features(&self) -> Option<usize> {
        self.trees.first().map(|t| t.n_features())
    }

    fn importances(&self, n_features: usize) -> Vec<f64> {
        let mut total = vec![0.0; n_features];
        for tree in &self.trees {
            for (acc, v) in total.iter_mut().zip(tree.importances()) {
                *acc += v;
            }
        }
        normalize(&mut total);
        total
    }
}

struct BoostSettings {
    n_estimators: usize,
    learning_rate: f64,
    subsample: f64,
    seed: u64,
}

impl BoostSettings {
    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PlacementError::Config("n_estimators must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PlacementError::Config("learning_rate must be positive".into()));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(PlacementError::Config("subsample must be in (0, 1]".into()));
        }
        Ok(())
    }
}

fn boost(
    settings: &BoostSettings,
    tree_params: &TreeParams,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<Ensemble> {
    settings.validate()?;
    tree_params.validate()?;

    let n = x.nrows();
    let base_score = y.mean().unwrap_or(0.0);
    let mut current = Array1::from_elem(n, base_score);
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let sample_size = ((n as f64 * settings.subsample).round() as usize).clamp(1, n);
    let mut trees = Vec::with_capacity(settings.n_estimators);

    for m in 0..settings.n_estimators {
        let residual = &y - &current;
        let indices = if sample_size < n {
            let mut picked = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
            picked.sort_unstable();
            picked
        } else {
            (0..n).collect()
        };
        let params = TreeParams {
            seed: settings.seed.wrapping_add(m as u64),
            ..tree_params.clone()
        };
        let tree = RegressionTree::grow(&params, x, residual.view(), indices);
        current.scaled_add(settings.learning_rate, &tree.predict(x));
        trees.push(tree);
    }

    Ok(Ensemble {
        base_score,
        learning_rate: settings.learning_rate,
        trees,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgbParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: Option<usize>,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
    pub subsample: f64,
    pub seed: u64,
}

impl Default for XgbParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: Some(6),
            reg_lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            subsample: 1.0,
            seed: 42,
        }
    }
}

/// Regularized second-order boosting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgbRegressor {
    pub params: XgbParams,
    ensemble: Option<Ensemble>,
}

impl XgbRegressor {
    pub fn new(params: XgbParams) -> Self {
        Self {
            params,
            ensemble: None,
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_estimators" => self.params.n_estimators = as_usize(name, value)?,
            "learning_rate" => self.params.learning_rate = as_f64(name, value)?,
            "max_depth" => self.params.max_depth = as_opt_usize(name, value)?,
            "reg_lambda" => self.params.reg_lambda = as_f64(name, value)?,
            "gamma" => self.params.gamma = as_f64(name, value)?,
            "min_child_weight" => self.params.min_child_weight = as_f64(name, value)?,
            "subsample" => self.params.subsample = as_f64(name, value)?,
            "seed" => self.params.seed = as_usize(name, value)? as u64,
            _ => return Err(unknown_param("XGBoost", name)),
        }
        Ok(())
    }

    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("n_estimators".to_string(), ParamValue::Int(self.params.n_estimators)),
            ("learning_rate".to_string(), ParamValue::Float(self.params.learning_rate)),
            ("max_depth".to_string(), ParamValue::opt_int(self.params.max_depth)),
            ("reg_lambda".to_string(), ParamValue::Float(self.params.reg_lambda)),
            ("gamma".to_string(), ParamValue::Float(self.params.gamma)),
        ])
    }

    pub fn is_fitted(&self) -> bool {
        self.ensemble.is_some()
    }
}

impl Regressor for XgbRegressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input("XGBoost", x, y)?;
        let p = &self.params;
        let settings = BoostSettings {
            n_estimators: p.n_estimators,
            learning_rate: p.learning_rate,
            subsample: p.subsample,
            seed: p.seed,
        };
        let tree_params = TreeParams {
            max_depth: p.max_depth,
            reg_lambda: p.reg_lambda,
            gamma: p.gamma,
            min_child_weight: p.min_child_weight,
            ..Default::default()
        };
        self.ensemble = Some(boost(&settings, &tree_params, x, y)?);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let ensemble = self.ensemble.as_ref().ok_or(PlacementError::NotTrained)?;
        if let Some(n) = ensemble.n_features() {
            check_predict_input(n, x)?;
        }
        Ok(ensemble.predict(x))
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        let ensemble = self.ensemble.as_ref()?;
        Some(ensemble.importances(ensemble.n_features()?))
    }
}
