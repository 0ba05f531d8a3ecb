//! Column summaries for dataset inspection

use crate::models::Dataset;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Summary statistics of a numeric column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl ColumnStats {
    fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                std: 0.0,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        // Sample standard deviation, as pandas reports it
        let std = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Self {
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std,
        }
    }
}

/// Row count and per-column summary of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: Vec<String>,
    pub numeric: BTreeMap<String, ColumnStats>,
    pub distinct: BTreeMap<String, usize>,
    pub missing_values: BTreeMap<String, usize>,
}

impl DatasetSummary {
    pub fn describe(dataset: &Dataset) -> Self {
        let s = &dataset.samples;
        let mut numeric = BTreeMap::new();
        let columns: [(&str, Vec<f64>); 4] = [
            ("cpu_usage", s.iter().map(|x| x.cpu_usage).collect()),
            ("memory", s.iter().map(|x| x.memory).collect()),
            ("network_io", s.iter().map(|x| x.network_io).collect()),
            ("power", s.iter().map(|x| x.power).collect()),
        ];
        for (name, values) in columns.iter() {
            numeric.insert(name.to_string(), ColumnStats::from_values(values));
        }

        let mut distinct = BTreeMap::new();
        distinct.insert(
            "vm".to_string(),
            s.iter().map(|x| x.vm.as_str()).collect::<BTreeSet<_>>().len(),
        );
        distinct.insert(
            "host".to_string(),
            s.iter().map(|x| x.host.as_str()).collect::<BTreeSet<_>>().len(),
        );

        let names: Vec<String> = super::DATASET_COLUMNS.iter().map(|c| c.to_string()).collect();
        // Parsed rows cannot hold missing values
        let missing_values = names.iter().map(|c| (c.clone(), 0)).collect();

        Self {
            rows: dataset.len(),
            columns: names,
            numeric,
            distinct,
            missing_values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sample;

    fn sample(cpu: f64, vm: &str, host: &str) -> Sample {
        Sample {
            cpu_usage: cpu,
            memory: 4.0,
            network_io: 1.0,
            power: 150.0,
            vm: vm.to_string(),
            host: host.to_string(),
        }
    }

    #[test]
    fn test_describe_stats() {
        let dataset = Dataset::new(vec![
            sample(10.0, "VM1", "H1"),
            sample(20.0, "VM2", "H1"),
            sample(30.0, "VM1", "H2"),
        ]);
        let summary = DatasetSummary::describe(&dataset);

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.columns.len(), 6);
        let cpu = summary.numeric["cpu_usage"];
        assert_eq!(cpu.min, 10.0);
        assert_eq!(cpu.max, 30.0);
        assert!((cpu.mean - 20.0).abs() < 1e-12);
        assert!((cpu.std - 10.0).abs() < 1e-12);
        assert_eq!(summary.distinct["vm"], 2);
        assert_eq!(summary.distinct["host"], 2);
        assert!(summary.missing_values.values().all(|&v| v == 0));
    }

    #[test]
    fn test_describe_empty() {
        let summary = DatasetSummary::describe(&Dataset::default());
        assert_eq!(summary.rows, 0);
        assert_eq!(summary.numeric["power"].mean, 0.0);
    }
}
