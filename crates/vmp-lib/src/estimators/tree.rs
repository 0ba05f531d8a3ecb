//! Regression trees
//!
//! A single CART builder serves the decision tree, the random forest and
//! both boosting ensembles. Split quality is the reduction of
//! `sum(y)^2 / (n + lambda)`, which is the squared-error criterion for
//! `lambda = 0` and the second-order boosting gain otherwise. Leaves hold
//! `sum(y) / (n + lambda)`.

use super::params::{as_f64, as_opt_usize, as_usize, unknown_param, ParamValue};
use super::{check_fit_input, check_predict_input, Regressor};
use crate::error::{PlacementError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Smallest gain accepted for a split
const MIN_GAIN: f64 = 1e-12;

/// Growth limits and regularization of a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; all when `None`
    pub max_features: Option<usize>,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            reg_lambda: 0.0,
            gamma: 0.0,
            min_child_weight: 0.0,
            seed: 42,
        }
    }
}

impl TreeParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == Some(0) {
            return Err(PlacementError::Config("max_depth must be at least 1".into()));
        }
        if self.min_samples_split < 2 {
            return Err(PlacementError::Config("min_samples_split must be at least 2".into()));
        }
        if self.min_samples_leaf < 1 {
            return Err(PlacementError::Config("min_samples_leaf must be at least 1".into()));
        }
        if self.max_features == Some(0) {
            return Err(PlacementError::Config("max_features must be at least 1".into()));
        }
        if !(self.reg_lambda >= 0.0 && self.gamma >= 0.0 && self.min_child_weight >= 0.0) {
            return Err(PlacementError::Config(
                "reg_lambda, gamma and min_child_weight must be non-negative".into(),
            ));
        }
        Ok(())
    }

    fn min_leaf(&self) -> usize {
        self.min_samples_leaf
            .max(self.min_child_weight.ceil() as usize)
            .max(1)
    }

    fn leaf_value(&self, sum: f64, n: usize) -> f64 {
        sum / (n as f64 + self.reg_lambda)
    }

    fn score(&self, sum: f64, n: usize) -> f64 {
        sum * sum / (n as f64 + self.reg_lambda)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    n_features: usize,
    importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Grow a tree on the rows listed in `indices` (repeats allowed)
    ///
    /// Callers validate `params` and pass at least one index.
    pub fn grow(
        params: &TreeParams,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        indices: Vec<usize>,
    ) -> Self {
        let n_features = x.ncols();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut importances = vec![0.0; n_features];
        let mut stack = vec![(0usize, indices, 0usize)];

        while let Some((node_id, idx, depth)) = stack.pop() {
            let sum: f64 = idx.iter().map(|&i| y[i]).sum();
            nodes[node_id] = Node::Leaf {
                value: params.leaf_value(sum, idx.len()),
            };

            let depth_reached = params.max_depth.map_or(false, |d| depth >= d);
            if depth_reached
                || idx.len() < params.min_samples_split
                || idx.len() < 2 * params.min_leaf()
            {
                continue;
            }

            let features = candidate_features(params, n_features, &mut rng);
            let Some(best) = best_split(params, x, y, &idx, sum, &features) else {
                continue;
            };

            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
                .iter()
                .copied()
                .partition(|&i| x[[i, best.feature]] <= best.threshold);
            importances[best.feature] += best.gain;

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[node_id] = Node::Split {
                feature: best.feature,
                threshold: best.threshold,
                left,
                right,
            };
            stack.push((right, right_idx, depth + 1));
            stack.push((left, left_idx, depth + 1));
        }

        normalize(&mut importances);
        Self {
            nodes,
            n_features,
            importances,
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

fn candidate_features(params: &TreeParams, n_features: usize, rng: &mut StdRng) -> Vec<usize> {
    match params.max_features {
        Some(k) if k < n_features => {
            let mut picked = rand::seq::index::sample(rng, n_features, k).into_vec();
            picked.sort_unstable();
            picked
        }
        _ => (0..n_features).collect(),
    }
}

fn best_split(
    params: &TreeParams,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    idx: &[usize],
    total: f64,
    features: &[usize],
) -> Option<BestSplit> {
    let n = idx.len();
    let min_leaf = params.min_leaf();
    let parent = params.score(total, n);
    let mut order = idx.to_vec();
    let mut best: Option<BestSplit> = None;

    for &f in features {
        order.sort_by(|&a, &b| x[[a, f]].total_cmp(&x[[b, f]]));
        let mut left_sum = 0.0;
        for k in 1..n {
            left_sum += y[order[k - 1]];
            let lo = x[[order[k - 1], f]];
            let hi = x[[order[k], f]];
            if lo >= hi || k < min_leaf || n - k < min_leaf {
                continue;
            }
            let raw = params.score(left_sum, k) + params.score(total - left_sum, n - k) - parent;
            let gain = 0.5 * raw - params.gamma;
            if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                let mid = lo + (hi - lo) / 2.0;
                best = Some(BestSplit {
                    feature: f,
                    threshold: if mid >= hi { lo } else { mid },
                    gain,
                });
            }
        }
    }

    best
}

pub(crate) fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}

/// Single CART regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub params: TreeParams,
    tree: Option<RegressionTree>,
}

impl DecisionTree {
    pub fn new(params: TreeParams) -> Self {
        Self { params, tree: None }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "max_depth" => self.params.max_depth = as_opt_usize(name, value)?,
            "min_samples_split" => self.params.min_samples_split = as_usize(name, value)?,
            "min_samples_leaf" => self.params.min_samples_leaf = as_usize(name, value)?,
            "max_features" => self.params.max_features = as_opt_usize(name, value)?,
            "seed" => self.params.seed = as_usize(name, value)? as u64,
            "reg_lambda" => self.params.reg_lambda = as_f64(name, value)?,
            _ => return Err(unknown_param("Decision Tree", name)),
        }
        Ok(())
    }

    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("max_depth".to_string(), ParamValue::opt_int(self.params.max_depth)),
            ("min_samples_split".to_string(), ParamValue::Int(self.params.min_samples_split)),
            ("min_samples_leaf".to_string(), ParamValue::Int(self.params.min_samples_leaf)),
            ("max_features".to_string(), ParamValue::opt_int(self.params.max_features)),
        ])
    }

    pub fn is_fitted(&self) -> bool {
        self.tree.is_some()
    }
}

impl Regressor for DecisionTree {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input("Decision Tree", x, y)?;
        self.params.validate()?;
        self.tree = Some(RegressionTree::grow(
            &self.params,
            x,
            y,
            (0..x.nrows()).collect(),
        ));
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let tree = self.tree.as_ref().ok_or(PlacementError::NotTrained)?;
        check_predict_input(tree.n_features(), x)?;
        Ok(tree.predict(x))
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.tree.as_ref().map(|t| t.importances().to_vec())
    }
}
