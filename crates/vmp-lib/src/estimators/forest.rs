//! Random forest regression
//!
//! Bagged CART trees grown in parallel. Each tree draws its bootstrap
//! sample from its own RNG derived from the forest seed, so the fitted
//! forest does not depend on thread scheduling.

use super::params::{as_opt_usize, as_usize, unknown_param, ParamValue};
use super::tree::{normalize, RegressionTree, TreeParams};
use super::{check_fit_input, check_predict_input, Regressor};
use crate::error::{PlacementError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn tree_params(&self, tree_index: usize) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            seed: tree_seed(self.seed, tree_index),
            ..Default::default()
        }
    }
}

fn tree_seed(seed: u64, tree_index: usize) -> u64 {
    seed.wrapping_add((tree_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_estimators" => self.params.n_estimators = as_usize(name, value)?,
            "max_depth" => self.params.max_depth = as_opt_usize(name, value)?,
            "min_samples_split" => self.params.min_samples_split = as_usize(name, value)?,
            "min_samples_leaf" => self.params.min_samples_leaf = as_usize(name, value)?,
            "max_features" => self.params.max_features = as_opt_usize(name, value)?,
            "seed" => self.params.seed = as_usize(name, value)? as u64,
            _ => return Err(unknown_param("Random Forest", name)),
        }
        Ok(())
    }

    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("n_estimators".to_string(), ParamValue::Int(self.params.n_estimators)),
            ("max_depth".to_string(), ParamValue::opt_int(self.params.max_depth)),
            ("min_samples_split".to_string(), ParamValue::Int(self.params.min_samples_split)),
            ("min_samples_leaf".to_string(), ParamValue::Int(self.params.min_samples_leaf)),
        ])
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input("Random Forest", x, y)?;
        if self.params.n_estimators == 0 {
            return Err(PlacementError::Config("n_estimators must be at least 1".into()));
        }
        self.params.tree_params(0).validate()?;

        let n = x.nrows();
        let params = &self.params;
        self.trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let tree_params = params.tree_params(t);
                let indices = if params.bootstrap {
                    let mut rng = StdRng::seed_from_u64(tree_params.seed);
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::grow(&tree_params, x, y, indices)
            })
            .collect();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let first = self.trees.first().ok_or(PlacementError::NotTrained)?;
        check_predict_input(first.n_features(), x)?;
        let mut sum = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            sum += &tree.predict(x);
        }
        Ok(sum / self.trees.len() as f64)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        let first = self.trees.first()?;
        let mut total = vec![0.0; first.n_features()];
        for tree in &self.trees {
            for (acc, v) in total.iter_mut().zip(tree.importances()) {
                *acc += v;
            }
        }
        normalize(&mut total);
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = Array1::from_shape_fn(60, |i| if i < 30 { 0.0 } else { 2.0 });
        (x, y)
    }

    #[test]
    fn test_forest_fits_step_function() {
        let (x, y) = step_data();
        let mut forest = RandomForest::new(ForestParams {
            n_estimators: 20,
            ..Default::default()
        });
        forest.fit(x.view(), y.view()).unwrap();
        let pred = forest.predict(x.view()).unwrap();
        assert!(pred[0] < 0.5);
        assert!(pred[59] > 1.5);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 10,
            ..Default::default()
        };
        let mut a = RandomForest::new(params.clone());
        let mut b = RandomForest::new(params);
        a.fit(x.view(), y.view()).unwrap();
        b.fit(x.view(), y.view()).unwrap();
        assert_eq!(a.predict(x.view()).unwrap(), b.predict(x.view()).unwrap());
    }

    #[test]
    fn test_importances_sum_to_one() {
        let (x, y) = step_data();
        let mut forest = RandomForest::new(ForestParams {
            n_estimators: 5,
            ..Default::default()
        });
        forest.fit(x.view(), y.view()).unwrap();
        let imp = forest.feature_importances().unwrap();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_zero_estimators_rejected() {
        let (x, y) = step_data();
        let mut forest = RandomForest::new(ForestParams {
            n_estimators: 0,
            ..Default::default()
        });
        assert!(forest.fit(x.view(), y.view()).is_err());
    }
}
