//! Seeded train/test and cross-validation splits

use crate::error::{PlacementError, Result};
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Datasets smaller than this are evaluated on their training rows
pub const MIN_HOLDOUT_SAMPLES: usize = 10;

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Row indices of a train/test split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    /// Train and test are the same rows
    pub in_sample: bool,
}

/// Stratified, seeded split of `labels` into train and test rows
///
/// Each label contributes `round(count * test_fraction)` rows to the test
/// set. The test set is never empty and at least one row stays in train.
pub fn train_test_split(labels: ArrayView1<f64>, test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PlacementError::Config(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }
    let n = labels.len();
    if n == 0 {
        return Err(PlacementError::DataFormat("cannot split an empty dataset".into()));
    }
    if n < MIN_HOLDOUT_SAMPLES {
        let all: Vec<usize> = (0..n).collect();
        return Ok(SplitIndices {
            train: all.clone(),
            test: all,
            in_sample: true,
        });
    }

    let mut strata: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        strata.entry(label.round() as i64).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n);
    let mut test = Vec::new();
    for rows in strata.values_mut() {
        rows.shuffle(&mut rng);
        let k = ((rows.len() as f64 * test_fraction).round() as usize).min(rows.len().saturating_sub(1));
        test.extend_from_slice(&rows[..k]);
        train.extend_from_slice(&rows[k..]);
    }
    if test.is_empty() {
        // Every stratum was a singleton; hold out one shuffled training row
        train.shuffle(&mut rng);
        if let Some(row) = train.pop() {
            test.push(row);
        }
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(SplitIndices {
        train,
        test,
        in_sample: false,
    })
}

/// Seeded k-fold partition of `0..n` into `(train, validation)` pairs
pub fn k_fold(n: usize, folds: usize, seed: u64) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if folds < 2 {
        return Err(PlacementError::Config("cross-validation needs at least 2 folds".into()));
    }
    if n < folds {
        return Err(PlacementError::Config(format!(
            "cannot run {}-fold cross-validation on {} rows",
            folds, n
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let base = n / folds;
    let extra = n % folds;
    let mut start = 0;
    let mut out = Vec::with_capacity(folds);
    for f in 0..folds {
        let len = base + usize::from(f < extra);
        let validation = order[start..start + len].to_vec();
        let train = order[..start]
            .iter()
            .chain(&order[start + len..])
            .copied()
            .collect();
        out.push((train, validation));
        start += len;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn labels(n: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| (i % 3) as f64)
    }

    #[test]
    fn test_split_is_stratified_and_disjoint() {
        let y = labels(300);
        let split = train_test_split(y.view(), 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 60);
        assert_eq!(split.train.len(), 240);
        assert!(!split.in_sample);
        for class in 0..3 {
            let in_test = split.test.iter().filter(|&&i| y[i] == class as f64).count();
            assert_eq!(in_test, 20);
        }
        assert!(split.train.iter().all(|i| !split.test.contains(i)));
    }

    #[test]
    fn test_split_is_seeded() {
        let y = labels(100);
        let a = train_test_split(y.view(), 0.2, 7).unwrap();
        let b = train_test_split(y.view(), 0.2, 7).unwrap();
        let c = train_test_split(y.view(), 0.2, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn test_tiny_dataset_is_in_sample() {
        let y = labels(3);
        let split = train_test_split(y.view(), 0.2, 42).unwrap();
        assert!(split.in_sample);
        assert_eq!(split.train, vec![0, 1, 2]);
        assert_eq!(split.test, vec![0, 1, 2]);
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let y = labels(20);
        assert!(train_test_split(y.view(), 0.0, 42).is_err());
        assert!(train_test_split(y.view(), 1.0, 42).is_err());
    }

    #[test]
    fn test_k_fold_partitions_rows() {
        let folds = k_fold(10, 3, 42).unwrap();
        assert_eq!(folds.len(), 3);
        let mut seen: Vec<usize> = folds.iter().flat_map(|(_, v)| v.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        for (train, validation) in &folds {
            assert_eq!(train.len() + validation.len(), 10);
        }
        assert!(k_fold(2, 3, 42).is_err());
    }
}
