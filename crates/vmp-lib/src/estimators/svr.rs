//! Epsilon support vector regression with a Gaussian kernel
//!
//! Fitting is delegated to `linfa-svm`. Large training sets are subsampled
//! to `max_train_samples` rows because the solver caches the kernel matrix.
//! The fitted solver state is not serializable, so snapshots carry the
//! training rows and the model is refit when a snapshot is loaded; the
//! solver is deterministic, so the refit model predicts identically.

use super::params::{as_f64, as_usize, unknown_param, ParamValue};
use super::{check_fit_input, check_predict_input, Regressor};
use crate::error::{PlacementError, Result};
use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_svm::Svm;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// RBF kernel width
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gamma {
    /// `1 / (n_features * var(X))`
    Scale,
    /// `1 / n_features`
    Auto,
    Value(f64),
}

impl Gamma {
    fn resolve(&self, x: ArrayView2<f64>) -> f64 {
        let n_features = x.ncols().max(1) as f64;
        match self {
            Gamma::Scale => {
                let mean = x.mean().unwrap_or(0.0);
                let var = x.mapv(|v| (v - mean) * (v - mean)).mean().unwrap_or(0.0);
                if var > 0.0 {
                    1.0 / (n_features * var)
                } else {
                    1.0
                }
            }
            Gamma::Auto => 1.0 / n_features,
            Gamma::Value(v) => *v,
        }
    }

    fn to_param(self) -> ParamValue {
        match self {
            Gamma::Scale => ParamValue::text("scale"),
            Gamma::Auto => ParamValue::text("auto"),
            Gamma::Value(v) => ParamValue::Float(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvrParams {
    pub c: f64,
    pub epsilon: f64,
    pub gamma: Gamma,
    pub tol: f64,
    pub max_train_samples: usize,
    pub seed: u64,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.1,
            gamma: Gamma::Scale,
            tol: 1e-3,
            max_train_samples: 1000,
            seed: 42,
        }
    }
}

/// Rows the model was fit on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TrainingSet {
    x: Array2<f64>,
    y: Array1<f64>,
}

#[derive(Clone)]
struct FittedSvr {
    model: Arc<Svm<f64, f64>>,
    training: TrainingSet,
}

fn train(params: &SvrParams, training: TrainingSet) -> Result<FittedSvr> {
    let gamma = params.gamma.resolve(training.x.view());
    let dataset = Dataset::new(training.x.clone(), training.y.clone());
    let model = Svm::<f64, f64>::params()
        .c_svr(params.c, Some(params.epsilon))
        // linfa's Gaussian kernel is exp(-d^2 / eps)
        .gaussian_kernel(1.0 / gamma)
        .eps(params.tol)
        .fit(&dataset)
        .map_err(|e| PlacementError::fit("SVR", e.to_string()))?;
    Ok(FittedSvr {
        model: Arc::new(model),
        training,
    })
}

/// Serialized form: hyperparameters plus the rows to refit on
#[derive(Serialize, Deserialize)]
struct SvrState {
    params: SvrParams,
    training: Option<TrainingSet>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "SvrState", into = "SvrState")]
pub struct Svr {
    pub params: SvrParams,
    fitted: Option<FittedSvr>,
}

impl TryFrom<SvrState> for Svr {
    type Error = PlacementError;

    fn try_from(state: SvrState) -> Result<Self> {
        let fitted = match state.training {
            Some(training) => Some(train(&state.params, training)?),
            None => None,
        };
        Ok(Self {
            params: state.params,
            fitted,
        })
    }
}

impl From<Svr> for SvrState {
    fn from(svr: Svr) -> Self {
        Self {
            params: svr.params,
            training: svr.fitted.map(|f| f.training),
        }
    }
}

impl fmt::Debug for Svr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Svr")
            .field("params", &self.params)
            .field("train_rows", &self.fitted.as_ref().map(|s| s.training.x.nrows()))
            .finish()
    }
}

impl PartialEq for Svr {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
            && self.fitted.as_ref().map(|f| &f.training) == other.fitted.as_ref().map(|f| &f.training)
    }
}

impl Svr {
    pub fn new(params: SvrParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "C" | "c" => self.params.c = as_f64(name, value)?,
            "epsilon" => self.params.epsilon = as_f64(name, value)?,
            "gamma" => {
                self.params.gamma = match value {
                    ParamValue::Text(t) if t == "scale" => Gamma::Scale,
                    ParamValue::Text(t) if t == "auto" => Gamma::Auto,
                    other => Gamma::Value(as_f64(name, other)?),
                }
            }
            "max_train_samples" => self.params.max_train_samples = as_usize(name, value)?,
            "seed" => self.params.seed = as_usize(name, value)? as u64,
            _ => return Err(unknown_param("SVR", name)),
        }
        Ok(())
    }

    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("C".to_string(), ParamValue::Float(self.params.c)),
            ("epsilon".to_string(), ParamValue::Float(self.params.epsilon)),
            ("gamma".to_string(), self.params.gamma.to_param()),
        ])
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn validate(&self) -> Result<()> {
        let p = &self.params;
        if !(p.c > 0.0 && p.c.is_finite()) {
            return Err(PlacementError::Config("C must be positive".into()));
        }
        if !(p.epsilon >= 0.0) {
            return Err(PlacementError::Config("epsilon must be non-negative".into()));
        }
        if let Gamma::Value(g) = p.gamma {
            if !(g > 0.0 && g.is_finite()) {
                return Err(PlacementError::Config("gamma must be positive".into()));
            }
        }
        if p.max_train_samples == 0 {
            return Err(PlacementError::Config("max_train_samples must be at least 1".into()));
        }
        Ok(())
    }
}

impl Regressor for Svr {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input("SVR", x, y)?;
        self.validate()?;
        let p = &self.params;

        let training = if x.nrows() > p.max_train_samples {
            let mut rng = StdRng::seed_from_u64(p.seed);
            let mut rows = rand::seq::index::sample(&mut rng, x.nrows(), p.max_train_samples).into_vec();
            rows.sort_unstable();
            TrainingSet {
                x: x.select(Axis(0), &rows),
                y: y.select(Axis(0), &rows),
            }
        } else {
            TrainingSet {
                x: x.to_owned(),
                y: y.to_owned(),
            }
        };

        self.fitted = Some(train(p, training)?);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or(PlacementError::NotTrained)?;
        check_predict_input(fitted.training.x.ncols(), x)?;
        let records = x.to_owned();
        let predicted: Array1<f64> = fitted.model.predict(&records);
        Ok(predicted)
    }
}
