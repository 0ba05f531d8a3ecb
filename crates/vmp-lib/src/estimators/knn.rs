//! k-nearest-neighbours regression

use super::params::{as_text, as_usize, unknown_param, ParamValue};
use super::{check_fit_input, check_predict_input, Regressor};
use crate::error::{PlacementError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnnWeights {
    Uniform,
    Distance,
}

impl KnnWeights {
    fn as_str(&self) -> &'static str {
        match self {
            KnnWeights::Uniform => "uniform",
            KnnWeights::Distance => "distance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnParams {
    pub n_neighbors: usize,
    pub weights: KnnWeights,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: KnnWeights::Uniform,
        }
    }
}

/// Brute-force Euclidean neighbour search over the stored training set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knn {
    pub params: KnnParams,
    train_x: Option<Array2<f64>>,
    train_y: Option<Array1<f64>>,
}

impl Knn {
    pub fn new(params: KnnParams) -> Self {
        Self {
            params,
            train_x: None,
            train_y: None,
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_neighbors" => self.params.n_neighbors = as_usize(name, value)?,
            "weights" => {
                self.params.weights = match as_text(name, value)? {
                    "uniform" => KnnWeights::Uniform,
                    "distance" => KnnWeights::Distance,
                    other => {
                        return Err(PlacementError::Config(format!(
                            "weights must be uniform or distance, got {}",
                            other
                        )))
                    }
                }
            }
            _ => return Err(unknown_param("KNN", name)),
        }
        Ok(())
    }

    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("n_neighbors".to_string(), ParamValue::Int(self.params.n_neighbors)),
            ("weights".to_string(), ParamValue::text(self.params.weights.as_str())),
        ])
    }

    pub fn is_fitted(&self) -> bool {
        self.train_x.is_some()
    }

    fn predict_row(&self, train_x: &Array2<f64>, train_y: &Array1<f64>, row: ArrayView1<f64>) -> f64 {
        let mut dists: Vec<(f64, usize)> = train_x
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, t)| {
                let d2: f64 = t.iter().zip(row.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                (d2.sqrt(), i)
            })
            .collect();
        let k = self.params.n_neighbors;
        dists.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
        let neighbours = &dists[..k];

        match self.params.weights {
            KnnWeights::Uniform => neighbours.iter().map(|&(_, i)| train_y[i]).sum::<f64>() / k as f64,
            KnnWeights::Distance => {
                // Exact matches take all the weight
                let exact: Vec<f64> = neighbours
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|&(_, i)| train_y[i])
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (num, den) = neighbours.iter().fold((0.0, 0.0), |(num, den), &(d, i)| {
                    (num + train_y[i] / d, den + 1.0 / d)
                });
                num / den
            }
        }
    }
}

impl Regressor for Knn {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_fit_input("KNN", x, y)?;
        let k = self.params.n_neighbors;
        if k == 0 {
            return Err(PlacementError::Config("n_neighbors must be at least 1".into()));
        }
        if k > x.nrows() {
            return Err(PlacementError::fit(
                "KNN",
                format!("n_neighbors={} exceeds {} training samples", k, x.nrows()),
            ));
        }
        self.train_x = Some(x.to_owned());
        self.train_y = Some(y.to_owned());
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let (Some(train_x), Some(train_y)) = (&self.train_x, &self.train_y) else {
            return Err(PlacementError::NotTrained);
        };
        check_predict_input(train_x.ncols(), x)?;
        let out: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|r| self.predict_row(train_x, train_y, x.row(r)))
            .collect();
        Ok(Array1::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn line() -> (Array2<f64>, Array1<f64>) {
        (array![[0.0], [1.0], [2.0], [10.0]], array![0.0, 1.0, 2.0, 10.0])
    }

    #[test]
    fn test_uniform_average() {
        let (x, y) = line();
        let mut knn = Knn::new(KnnParams {
            n_neighbors: 3,
            weights: KnnWeights::Uniform,
        });
        knn.fit(x.view(), y.view()).unwrap();
        let pred = knn.predict(array![[0.9]].view()).unwrap();
        assert!((pred[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_weights_exact_match() {
        let (x, y) = line();
        let mut knn = Knn::new(KnnParams {
            n_neighbors: 3,
            weights: KnnWeights::Distance,
        });
        knn.fit(x.view(), y.view()).unwrap();
        let pred = knn.predict(x.view()).unwrap();
        assert_eq!(pred, y);
    }

    #[test]
    fn test_distance_weights_favour_closer_points() {
        let (x, y) = line();
        let mut knn = Knn::new(KnnParams {
            n_neighbors: 2,
            weights: KnnWeights::Distance,
        });
        knn.fit(x.view(), y.view()).unwrap();
        // neighbours 0 (d=0.25) and 1 (d=0.75): (0/0.25 + 1/0.75) / (4 + 4/3)
        let pred = knn.predict(array![[0.25]].view()).unwrap();
        assert!((pred[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_k_larger_than_training_set_fails() {
        let (x, y) = line();
        let mut knn = Knn::new(KnnParams {
            n_neighbors: 9,
            weights: KnnWeights::Uniform,
        });
        assert!(matches!(
            knn.fit(x.view(), y.view()),
            Err(PlacementError::FitFailure { .. })
        ));
    }

    #[test]
    fn test_weights_param_parsing() {
        let mut knn = Knn::new(KnnParams::default());
        knn.set_param("weights", &ParamValue::text("distance")).unwrap();
        assert_eq!(knn.params.weights, KnnWeights::Distance);
        assert!(knn.set_param("weights", &ParamValue::text("cosine")).is_err());
    }
}
