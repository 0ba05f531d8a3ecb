//! Multi-layer perceptron regression
//!
//! ReLU hidden layers and a linear output trained on half squared error
//! with L2 penalty, mini-batch Adam and Glorot-uniform initialization.
//! Training stops after `n_iter_no_change` epochs without the epoch loss
//! improving by at least `tol`.

use super::params::{as_f64, as_usize, unknown_param, ParamValue};
use super::{check_fit_input, check_predict_input, Regressor};
use crate::error::{PlacementError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    pub hidden_layer_sizes: Vec<usize>,
    pub max_iter: usize,
    pub learning_rate_init: f64,
    pub alpha: f64,
    pub batch_size: usize,
    pub tol: f64,
    pub n_iter_no_change: usize,
    pub seed: u64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layer_sizes: vec![100, 50],
            max_iter: 500,
            learning_rate_init: 0.001,
            alpha: 1e-4,
            batch_size: 200,
            tol: 1e-4,
            n_iter_no_change: 10,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Layer {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// First and second moment estimates for one layer
struct AdamState {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl AdamState {
    fn for_layer(layer: &Layer) -> Self {
        Self {
            m_w: Array2::zeros(layer.weights.raw_dim()),
            v_w: Array2::zeros(layer.weights.raw_dim()),
            m_b: Array1::zeros(layer.bias.raw_dim()),
            v_b: Array1::zeros(layer.bias.raw_dim()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    pub params: MlpParams,
    layers: Vec<Layer>,
    n_iter: usize,
}

impl Mlp {
    pub fn new(params: MlpParams) -> Self {
        Self {
            params,
            layers: Vec::new(),
            n_iter: 0,
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "max_iter" => self.params.max_iter = as_usize(name, value)?,
            "learning_rate_init" => self.params.learning_rate_init = as_f64(name, value)?,
            "alpha" => self.params.alpha = as_f64(name, value)?,
            "batch_size" => self.params.batch_size = as_usize(name, value)?,
            "seed" => self.params.seed = as_usize(name, value)? as u64,
            _ => return Err(unknown_param("Neural Network", name)),
        }
        Ok(())
    }

    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        let sizes: Vec<String> = self.params.hidden_layer_sizes.iter().map(|s| s.to_string()).collect();
        BTreeMap::from([
            (
                "hidden_layer_sizes".to_string(),
                ParamValue::text(format!("({})", sizes.join(", "))),
            ),
            ("max_iter".to_string(), ParamValue::Int(self.params.max_iter)),
            (
                "learning_rate_init".to_string(),
                ParamValue::Float(self.params.learning_rate_init),
            ),
        ])
    }

    pub fn is_fitted(&self) -> bool {
        !self.layers.is_empty()
    }

    /// Epochs run by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn validate(&self) -> Result<()> {
        let p = &self.params;
        if p.hidden_layer_sizes.iter().any(|&s| s == 0) {
            return Err(PlacementError::Config("hidden layers must have at least one unit".into()));
        }
        if p.max_iter == 0 || p.batch_size == 0 {
            return Err(PlacementError::Config("max_iter and batch_size must be at least 1".into()));
        }
        if !(p.learning_rate_init > 0.0 && p.alpha >= 0.0) {
            return Err(PlacementError::Config(
                "learning_rate_init must be positive and alpha non-negative".into(),
            ));
        }
        Ok(())
    }

    fn init_layers(&self, n_features: usize, rng: &mut StdRng) -> Vec<Layer> {
        let mut sizes = vec![n_features];
        sizes.extend(&self.params.hidden_layer_sizes);
        sizes.push(1);
        sizes
            .windows(2)
            .map(|w| {
                let (fan_in, fan_out) = (w[0], w[1]);
                let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
                Layer {
                    weights: Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-bound..bound)),
                    bias: Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound)),
                }
            })
            .collect()
    }

    /// Activations of every layer, input first
    fn forward(layers: &[Layer], x: Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(layers.len() + 1);
        activations.push(x);
        for (i, layer) in layers.iter().enumerate() {
            let mut z = activations[i].dot(&layer.weights) + &layer.bias;
            if i + 1 < layers.len() {
                z.mapv_inplace(|v| v.max(0.0));
            }
            activations.push(z);
        }
        activations
    }
}

impl Regressor for Mlp {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input("Neural Network", x, y)?;
        self.validate()?;
        let p = self.params.clone();
        let n = x.nrows();

        let mut rng = StdRng::seed_from_u64(p.seed);
        let mut layers = self.init_layers(x.ncols(), &mut rng);
        let mut adam: Vec<AdamState> = layers.iter().map(AdamState::for_layer).collect();
        let mut order: Vec<usize> = (0..n).collect();
        let mut step = 0i32;
        let mut best_loss = f64::INFINITY;
        let mut stale = 0;
        let mut epochs = 0;

        for _ in 0..p.max_iter {
            epochs += 1;
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(p.batch_size) {
                let bs = batch.len() as f64;
                let xb = x.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch).insert_axis(Axis(1));
                let activations = Self::forward(&layers, xb);
                let output = &activations[layers.len()];

                let mut delta = output - &yb;
                epoch_loss += 0.5 * delta.mapv(|d| d * d).sum();
                let penalty: f64 = layers.iter().map(|l| l.weights.mapv(|w| w * w).sum()).sum();
                epoch_loss += 0.5 * p.alpha * penalty * bs / n as f64;

                step += 1;
                let lr = p.learning_rate_init * (1.0 - BETA2.powi(step)).sqrt() / (1.0 - BETA1.powi(step));

                for l in (0..layers.len()).rev() {
                    let grad_w = (activations[l].t().dot(&delta) + &(&layers[l].weights * p.alpha)) / bs;
                    let grad_b = delta.sum_axis(Axis(0)) / bs;
                    if l > 0 {
                        let mut prev = delta.dot(&layers[l].weights.t());
                        prev.zip_mut_with(&activations[l], |d, &a| {
                            if a <= 0.0 {
                                *d = 0.0;
                            }
                        });
                        delta = prev;
                    }

                    let state = &mut adam[l];
                    state.m_w = &state.m_w * BETA1 + &grad_w * (1.0 - BETA1);
                    state.v_w = &state.v_w * BETA2 + &grad_w.mapv(|g| g * g) * (1.0 - BETA2);
                    state.m_b = &state.m_b * BETA1 + &grad_b * (1.0 - BETA1);
                    state.v_b = &state.v_b * BETA2 + &grad_b.mapv(|g| g * g) * (1.0 - BETA2);

                    let layer = &mut layers[l];
                    Zip::from(&mut layer.weights)
                        .and(&state.m_w)
                        .and(&state.v_w)
                        .for_each(|w, &m, &v| *w -= lr * m / (v.sqrt() + ADAM_EPS));
                    Zip::from(&mut layer.bias)
                        .and(&state.m_b)
                        .and(&state.v_b)
                        .for_each(|b, &m, &v| *b -= lr * m / (v.sqrt() + ADAM_EPS));
                }
            }

            let loss = epoch_loss / n as f64;
            if !loss.is_finite() {
                return Err(PlacementError::fit("Neural Network", "training loss diverged"));
            }
            if loss > best_loss - p.tol {
                stale += 1;
            } else {
                stale = 0;
            }
            best_loss = best_loss.min(loss);
            if stale >= p.n_iter_no_change {
                debug!(epochs, loss, "MLP training converged");
                break;
            }
        }

        self.layers = layers;
        self.n_iter = epochs;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let first = self.layers.first().ok_or(PlacementError::NotTrained)?;
        check_predict_input(first.weights.nrows(), x)?;
        let mut activations = Self::forward(&self.layers, x.to_owned());
        let output = activations.pop().ok_or(PlacementError::NotTrained)?;
        Ok(output.column(0).to_owned())
    }
}
