//! Feature matrix construction
//!
//! Derives ratio and intensity columns from raw samples and label-encodes
//! the VM and host identifiers. The fitted encoders are kept so requests can
//! be encoded identically and predictions mapped back to host names.

use super::LabelEncoder;
use crate::error::{PlacementError, Result};
use crate::models::{Dataset, PlacementRequest, Sample};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Number of columns in the feature matrix
pub const NUM_FEATURES: usize = 8;

/// Feature column names, in matrix order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "cpu",
    "memory",
    "network_io",
    "power",
    "cpu_memory_ratio",
    "resource_intensity",
    "power_efficiency",
    "vm_encoded",
];

/// Derived columns computed from one row of raw values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFeatures {
    pub cpu_memory_ratio: f64,
    pub resource_intensity: f64,
    pub power_efficiency: f64,
}

impl DerivedFeatures {
    /// Denominators are offset by one so zero cpu or memory stays finite
    pub fn compute(cpu: f64, memory: f64, power: f64) -> Self {
        Self {
            cpu_memory_ratio: cpu / (memory + 1.0),
            resource_intensity: (cpu + memory) / 2.0,
            power_efficiency: power / (cpu + 1.0),
        }
    }
}

/// Fitted encoders for the categorical columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBuilder {
    vm_encoder: LabelEncoder,
    host_encoder: LabelEncoder,
}

/// Numeric feature matrix with host label codes
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl FeatureMatrix {
    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }
}

impl FeatureBuilder {
    /// Fit encoders on the full dataset and build its feature matrix
    pub fn fit(dataset: &Dataset) -> Result<(Self, FeatureMatrix)> {
        if dataset.is_empty() {
            return Err(PlacementError::DataFormat("dataset has no rows".to_string()));
        }
        let builder = Self {
            vm_encoder: LabelEncoder::fit("vm", dataset.samples.iter().map(|s| s.vm.as_str())),
            host_encoder: LabelEncoder::fit(
                "host",
                dataset.samples.iter().map(|s| s.host.as_str()),
            ),
        };
        let matrix = builder.build(dataset)?;
        Ok((builder, matrix))
    }

    /// Build the feature matrix of a dataset with the fitted encoders
    pub fn build(&self, dataset: &Dataset) -> Result<FeatureMatrix> {
        let n = dataset.len();
        let mut x = Array2::zeros((n, NUM_FEATURES));
        let mut y = Array1::zeros(n);

        for (i, sample) in dataset.samples.iter().enumerate() {
            let vm_code = self.vm_encoder.transform(&sample.vm)?;
            x.row_mut(i).assign(&feature_row(sample_values(sample), vm_code));
            y[i] = self.host_encoder.transform(&sample.host)? as f64;
        }

        Ok(FeatureMatrix { x, y })
    }

    /// Feature row for a prediction request
    ///
    /// An unseen VM maps to the reserved code; the second value reports
    /// whether the VM was known.
    pub fn request_row(&self, request: &PlacementRequest) -> (Array1<f64>, bool) {
        let (vm_code, known) = self.vm_encoder.transform_or_reserved(&request.vm);
        let raw = [request.cpu, request.memory, request.network_io, request.power];
        (feature_row(raw, vm_code), known)
    }

    pub fn vm_encoder(&self) -> &LabelEncoder {
        &self.vm_encoder
    }

    pub fn host_encoder(&self) -> &LabelEncoder {
        &self.host_encoder
    }

    pub fn feature_names(&self) -> Vec<String> {
        FEATURE_NAMES.iter().map(|f| f.to_string()).collect()
    }
}

fn sample_values(sample: &Sample) -> [f64; 4] {
    [sample.cpu_usage, sample.memory, sample.network_io, sample.power]
}

fn feature_row(raw: [f64; 4], vm_code: usize) -> Array1<f64> {
    let [cpu, memory, network_io, power] = raw;
    let derived = DerivedFeatures::compute(cpu, memory, power);
    Array1::from(vec![
        cpu,
        memory,
        network_io,
        power,
        derived.cpu_memory_ratio,
        derived.resource_intensity,
        derived.power_efficiency,
        vm_code as f64,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::generate;

    fn scenario_dataset() -> Dataset {
        let row = |cpu, memory, net, power, vm: &str, host: &str| Sample {
            cpu_usage: cpu,
            memory,
            network_io: net,
            power,
            vm: vm.to_string(),
            host: host.to_string(),
        };
        Dataset::new(vec![
            row(10.0, 2.0, 0.5, 120.0, "VM1", "H1"),
            row(90.0, 30.0, 4.8, 290.0, "VM2", "H2"),
            row(50.0, 16.0, 2.5, 200.0, "VM3", "H1"),
        ])
    }

    #[test]
    fn test_fixed_column_count_no_missing_values() {
        let dataset = generate(300, 3);
        let (_, matrix) = FeatureBuilder::fit(&dataset).unwrap();
        assert_eq!(matrix.x.ncols(), NUM_FEATURES);
        assert_eq!(matrix.nrows(), 300);
        assert!(matrix.x.iter().all(|v| v.is_finite()));
        assert!(matrix.y.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_derived_columns() {
        let (builder, matrix) = FeatureBuilder::fit(&scenario_dataset()).unwrap();
        let row = matrix.x.row(0);
        assert_eq!(row[4], 10.0 / 3.0);
        assert_eq!(row[5], 6.0);
        assert_eq!(row[6], 120.0 / 11.0);
        assert_eq!(row[7], 0.0);
        assert_eq!(matrix.y.to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(builder.host_encoder().classes(), &["H1", "H2"]);
    }

    #[test]
    fn test_zero_denominators_are_guarded() {
        let d = DerivedFeatures::compute(0.0, 0.0, 100.0);
        assert_eq!(d.cpu_memory_ratio, 0.0);
        assert_eq!(d.power_efficiency, 100.0);
        assert!(d.resource_intensity.is_finite());
    }

    #[test]
    fn test_request_row_matches_training_row() {
        let (builder, matrix) = FeatureBuilder::fit(&scenario_dataset()).unwrap();
        let request = PlacementRequest::new(90.0, 30.0, 4.8, 290.0, "VM2");
        let (row, known) = builder.request_row(&request);
        assert!(known);
        assert_eq!(row, matrix.x.row(1).to_owned());
    }

    #[test]
    fn test_unknown_vm_maps_to_reserved_code() {
        let (builder, _) = FeatureBuilder::fit(&scenario_dataset()).unwrap();
        let request = PlacementRequest::new(20.0, 4.0, 1.0, 150.0, "VM42");
        let (row, known) = builder.request_row(&request);
        assert!(!known);
        assert_eq!(row[7], 3.0);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        assert!(matches!(
            FeatureBuilder::fit(&Dataset::default()),
            Err(PlacementError::DataFormat(_))
        ));
    }
}
