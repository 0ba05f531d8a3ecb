//! Regression estimators
//!
//! Every family implements [`Regressor`]. [`Estimator`] wraps them in one
//! serializable enum so fitted models can be stored in a snapshot and
//! configured by name from a hyperparameter grid.

mod boosting;
mod forest;
mod gradient;
mod knn;
mod mlp;
mod params;
mod svr;
mod tree;

pub use boosting::{XgbParams, XgbRegressor};
pub use forest::{ForestParams, RandomForest};
pub use gradient::{GradientBoosting, GradientBoostingParams};
pub use knn::{Knn, KnnParams, KnnWeights};
pub use mlp::{Mlp, MlpParams};
pub use params::ParamValue;
pub use svr::{Gamma, Svr, SvrParams};
pub use tree::{DecisionTree, RegressionTree, TreeParams};

use crate::error::{PlacementError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Common interface of all regression models
pub trait Regressor {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()>;

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Normalized impurity-based importances, for models that have them
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

pub(crate) fn check_fit_input(family: &str, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(PlacementError::fit(family, "training data is empty"));
    }
    if x.nrows() != y.len() {
        return Err(PlacementError::fit(
            family,
            format!("{} rows but {} targets", x.nrows(), y.len()),
        ));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(PlacementError::fit(family, "training data contains non-finite values"));
    }
    Ok(())
}

pub(crate) fn check_predict_input(n_features: usize, x: ArrayView2<f64>) -> Result<()> {
    if x.ncols() != n_features {
        return Err(PlacementError::DataFormat(format!(
            "expected {} features, got {}",
            n_features,
            x.ncols()
        )));
    }
    Ok(())
}

/// A model of any supported family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family")]
pub enum Estimator {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    XGBoost(XgbRegressor),
    Knn(Knn),
    Svr(Svr),
    DecisionTree(DecisionTree),
    Mlp(Mlp),
}

impl Estimator {
    fn inner(&self) -> &dyn Regressor {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::GradientBoosting(m) => m,
            Estimator::XGBoost(m) => m,
            Estimator::Knn(m) => m,
            Estimator::Svr(m) => m,
            Estimator::DecisionTree(m) => m,
            Estimator::Mlp(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Regressor {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::GradientBoosting(m) => m,
            Estimator::XGBoost(m) => m,
            Estimator::Knn(m) => m,
            Estimator::Svr(m) => m,
            Estimator::DecisionTree(m) => m,
            Estimator::Mlp(m) => m,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            Estimator::RandomForest(_) => "random_forest",
            Estimator::GradientBoosting(_) => "gradient_boosting",
            Estimator::XGBoost(_) => "xgboost",
            Estimator::Knn(_) => "knn",
            Estimator::Svr(_) => "svr",
            Estimator::DecisionTree(_) => "decision_tree",
            Estimator::Mlp(_) => "mlp",
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match self {
            Estimator::RandomForest(m) => m.set_param(name, value),
            Estimator::GradientBoosting(m) => m.set_param(name, value),
            Estimator::XGBoost(m) => m.set_param(name, value),
            Estimator::Knn(m) => m.set_param(name, value),
            Estimator::Svr(m) => m.set_param(name, value),
            Estimator::DecisionTree(m) => m.set_param(name, value),
            Estimator::Mlp(m) => m.set_param(name, value),
        }
    }

    /// Apply every entry of `params` in order
    pub fn with_params(mut self, params: &BTreeMap<String, ParamValue>) -> Result<Self> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(self)
    }

    /// Current hyperparameters, as reported to clients
    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        match self {
            Estimator::RandomForest(m) => m.params(),
            Estimator::GradientBoosting(m) => m.params(),
            Estimator::XGBoost(m) => m.params(),
            Estimator::Knn(m) => m.params(),
            Estimator::Svr(m) => m.params(),
            Estimator::DecisionTree(m) => m.params(),
            Estimator::Mlp(m) => m.params(),
        }
    }

    /// Same family and hyperparameters, without fitted state
    pub fn unfitted(&self) -> Self {
        match self {
            Estimator::RandomForest(m) => Estimator::RandomForest(RandomForest::new(m.params.clone())),
            Estimator::GradientBoosting(m) => {
                Estimator::GradientBoosting(GradientBoosting::new(m.params.clone()))
            }
            Estimator::XGBoost(m) => Estimator::XGBoost(XgbRegressor::new(m.params.clone())),
            Estimator::Knn(m) => Estimator::Knn(Knn::new(m.params.clone())),
            Estimator::Svr(m) => Estimator::Svr(Svr::new(m.params.clone())),
            Estimator::DecisionTree(m) => Estimator::DecisionTree(DecisionTree::new(m.params.clone())),
            Estimator::Mlp(m) => Estimator::Mlp(Mlp::new(m.params.clone())),
        }
    }

    pub fn is_fitted(&self) -> bool {
        match self {
            Estimator::RandomForest(m) => m.is_fitted(),
            Estimator::GradientBoosting(m) => m.is_fitted(),
            Estimator::XGBoost(m) => m.is_fitted(),
            Estimator::Knn(m) => m.is_fitted(),
            Estimator::Svr(m) => m.is_fitted(),
            Estimator::DecisionTree(m) => m.is_fitted(),
            Estimator::Mlp(m) => m.is_fitted(),
        }
    }
}

impl Regressor for Estimator {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.inner().feature_importances()
    }
}
