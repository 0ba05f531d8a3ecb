//! Regression metrics

use crate::models::ModelMetrics;
use ndarray::ArrayView1;

/// MSE, R² and MAE of `y_pred` against `y_true`
///
/// A constant `y_true` has no variance to explain: R² is 1.0 when the
/// predictions are exact and 0.0 otherwise.
pub fn regression_metrics(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> ModelMetrics {
    let n = y_true.len();
    if n == 0 || n != y_pred.len() {
        return ModelMetrics {
            mse: f64::NAN,
            r2: f64::NAN,
            mae: f64::NAN,
        };
    }
    let nf = n as f64;
    let mean = y_true.sum() / nf;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut abs_err = 0.0;
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let err = t - p;
        ss_res += err * err;
        abs_err += err.abs();
        ss_tot += (t - mean) * (t - mean);
    }

    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    ModelMetrics {
        mse: ss_res / nf,
        r2,
        mae: abs_err / nf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction() {
        let y = array![0.0, 1.0, 2.0];
        let m = regression_metrics(y.view(), y.view());
        assert_eq!(m.mse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.r2, 1.0);
    }

    #[test]
    fn test_known_values() {
        let y = array![0.0, 1.0, 2.0, 3.0];
        let p = array![0.0, 1.0, 2.0, 5.0];
        let m = regression_metrics(y.view(), p.view());
        assert_eq!(m.mse, 1.0);
        assert_eq!(m.mae, 0.5);
        // ss_tot = 5, ss_res = 4
        assert!((m.r2 - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_mean_prediction_scores_zero() {
        let y = array![1.0, 3.0];
        let p = array![2.0, 2.0];
        assert_eq!(regression_metrics(y.view(), p.view()).r2, 0.0);
    }

    #[test]
    fn test_constant_truth() {
        let y = array![2.0, 2.0];
        assert_eq!(regression_metrics(y.view(), y.view()).r2, 1.0);
        assert_eq!(regression_metrics(y.view(), array![2.0, 3.0].view()).r2, 0.0);
    }
}
