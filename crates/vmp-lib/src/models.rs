//! Core data models for the placement service

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of VM resource usage with its assigned host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(alias = "cpu")]
    pub cpu_usage: f64,
    pub memory: f64,
    pub network_io: f64,
    pub power: f64,
    pub vm: String,
    pub host: String,
}

/// Ordered collection of samples sharing one schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub samples: Vec<Sample>,
}

impl Dataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Regression metrics recorded for a model on the test split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(rename = "MSE")]
    pub mse: f64,
    #[serde(rename = "R2")]
    pub r2: f64,
    #[serde(rename = "MAE")]
    pub mae: f64,
}

/// Relative weights of the proxy objectives
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    #[serde(default = "default_cost_weight")]
    pub cost: f64,
    #[serde(default = "default_energy_weight")]
    pub energy: f64,
    #[serde(default = "default_load_weight")]
    pub load: f64,
}

fn default_cost_weight() -> f64 {
    0.34
}

fn default_energy_weight() -> f64 {
    0.33
}

fn default_load_weight() -> f64 {
    0.33
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            cost: default_cost_weight(),
            energy: default_energy_weight(),
            load: default_load_weight(),
        }
    }
}

/// Raw features of a VM to place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub cpu: f64,
    pub memory: f64,
    pub network_io: f64,
    pub power: f64,
    #[serde(default = "default_vm")]
    pub vm: String,
    #[serde(default)]
    pub weights: Option<ObjectiveWeights>,
}

fn default_vm() -> String {
    "VM1".to_string()
}

impl PlacementRequest {
    pub fn new(cpu: f64, memory: f64, network_io: f64, power: f64, vm: impl Into<String>) -> Self {
        Self {
            cpu,
            memory,
            network_io,
            power,
            vm: vm.into(),
            weights: None,
        }
    }
}

/// Recommendation produced by the best model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommended_host: String,
    pub best_model: String,
    pub confidence: f64,
}

/// Proxy cost/energy/load objectives for a placement request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objectives {
    pub cost: f64,
    pub energy: f64,
    pub load_balance: f64,
    pub weighted_score: f64,
    pub weights: ObjectiveWeights,
}

/// Output of a prediction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: Recommendation,
    pub all_predictions: BTreeMap<String, f64>,
    pub objectives: Objectives,
    pub unknown_vm: bool,
    pub snapshot_version: u64,
}

/// Host capacity and running costs, used by host scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostProfile {
    pub host_id: String,
    pub cpu_capacity: f64,
    pub ram_capacity: f64,
    pub energy: f64,
    pub cost: f64,
}

/// Resource demand of a VM, used by host scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VmDemand {
    pub cpu_demand: f64,
    pub ram_demand: f64,
}

/// Weights for host scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostScoreWeights {
    pub cpu: f64,
    pub energy: f64,
    pub cost: f64,
}

impl Default for HostScoreWeights {
    fn default() -> Self {
        Self {
            cpu: 0.4,
            energy: 0.3,
            cost: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_vm() {
        let req: PlacementRequest =
            serde_json::from_str(r#"{"cpu": 50, "memory": 8, "network_io": 1.5, "power": 200}"#)
                .unwrap();
        assert_eq!(req.vm, "VM1");
        assert!(req.weights.is_none());
    }

    #[test]
    fn test_metrics_serialize_with_upper_keys() {
        let m = ModelMetrics {
            mse: 0.1,
            r2: 0.9,
            mae: 0.2,
        };
        let json = serde_json::to_value(m).unwrap();
        assert_eq!(json["R2"], 0.9);
        assert!(json.get("MSE").is_some());
        assert!(json.get("MAE").is_some());
    }

    #[test]
    fn test_sample_accepts_cpu_alias() {
        let s: Sample = serde_json::from_str(
            r#"{"cpu": 10, "memory": 2, "network_io": 0.5, "power": 120, "vm": "VM1", "host": "H1"}"#,
        )
        .unwrap();
        assert_eq!(s.cpu_usage, 10.0);
    }

    #[test]
    fn test_partial_weights_use_defaults() {
        let w: ObjectiveWeights = serde_json::from_str(r#"{"cost": 1.0}"#).unwrap();
        assert_eq!(w.cost, 1.0);
        assert_eq!(w.energy, 0.33);
        assert_eq!(w.load, 0.33);
    }
}
