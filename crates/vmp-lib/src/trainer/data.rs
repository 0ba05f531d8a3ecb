//! Feature matrices for one training run

use super::split::{train_test_split, SplitIndices};
use crate::error::Result;
use crate::features::{FeatureBuilder, StandardScaler};
use crate::models::Dataset;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Shape of the split a snapshot was trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub train_rows: usize,
    pub test_rows: usize,
    pub in_sample: bool,
    pub n_features: usize,
}

/// Encoded, split and scaled data shared by every model of a run
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub builder: FeatureBuilder,
    pub scaler: StandardScaler,
    pub split: SplitIndices,
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
    x_train_scaled: Array2<f64>,
    x_test_scaled: Array2<f64>,
}

impl PreparedData {
    /// Encode `dataset`, split it and fit the scaler on the training rows
    pub fn prepare(dataset: &Dataset, test_fraction: f64, seed: u64) -> Result<Self> {
        let (builder, matrix) = FeatureBuilder::fit(dataset)?;
        let split = train_test_split(matrix.y.view(), test_fraction, seed)?;

        let x_train = matrix.x.select(Axis(0), &split.train);
        let y_train = matrix.y.select(Axis(0), &split.train);
        let x_test = matrix.x.select(Axis(0), &split.test);
        let y_test = matrix.y.select(Axis(0), &split.test);

        let scaler = StandardScaler::fit(x_train.view());
        let x_train_scaled = scaler.transform(x_train.view());
        let x_test_scaled = scaler.transform(x_test.view());

        Ok(Self {
            builder,
            scaler,
            split,
            x_train,
            y_train,
            x_test,
            y_test,
            x_train_scaled,
            x_test_scaled,
        })
    }

    pub fn train(&self, scaled: bool) -> (ArrayView2<'_, f64>, ArrayView1<'_, f64>) {
        let x = if scaled { &self.x_train_scaled } else { &self.x_train };
        (x.view(), self.y_train.view())
    }

    pub fn test(&self, scaled: bool) -> (ArrayView2<'_, f64>, ArrayView1<'_, f64>) {
        let x = if scaled { &self.x_test_scaled } else { &self.x_test };
        (x.view(), self.y_test.view())
    }

    pub fn summary(&self) -> SplitSummary {
        SplitSummary {
            train_rows: self.y_train.len(),
            test_rows: self.y_test.len(),
            in_sample: self.split.in_sample,
            n_features: self.x_train.ncols(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::generate;
    use crate::features::NUM_FEATURES;

    #[test]
    fn test_prepare_shapes() {
        let data = PreparedData::prepare(&generate(200, 42), 0.2, 42).unwrap();
        let summary = data.summary();
        assert_eq!(summary.train_rows + summary.test_rows, 200);
        assert_eq!(summary.n_features, NUM_FEATURES);

        let (x, y) = data.train(true);
        assert_eq!(x.nrows(), y.len());
        // Scaled training columns are centered
        for col in x.columns() {
            assert!(col.mean().unwrap().abs() < 1e-9);
        }
        assert!(data.test(false).0.iter().all(|v| v.is_finite()));
    }
}
