//! Placement commands: model-based prediction and rule-based host scoring

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::client::{
    ApiClient, ObjectiveWeights, PredictRequest, PredictResponse, ScoreHostsRequest,
    ScoreHostsResponse,
};
use crate::output::{color_confidence, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct ModelPredictionRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Raw output")]
    output: String,
}

/// Build the request body, adding weights only when any was given
pub fn build_request(
    cpu: f64,
    memory: f64,
    network_io: f64,
    power: f64,
    vm: String,
    weights: [Option<f64>; 3],
) -> PredictRequest {
    let weights = match weights {
        [None, None, None] => None,
        [cost, energy, load] => Some(ObjectiveWeights {
            cost: cost.unwrap_or(0.0),
            energy: energy.unwrap_or(0.0),
            load: load.unwrap_or(0.0),
        }),
    };
    PredictRequest {
        cpu,
        memory,
        network_io,
        power,
        vm,
        weights,
    }
}

/// Ask the server for a host recommendation
pub async fn predict(client: &ApiClient, request: PredictRequest, format: OutputFormat) -> Result<()> {
    let response: PredictResponse = client.post("api/ml/predict", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let p = &response.prediction;
            println!("{}", "Placement Recommendation".bold());
            println!("{}", "=".repeat(50));
            println!("VM:                     {}", request.vm.cyan());
            println!("Recommended host:       {}", p.recommended_host.green().bold());
            println!("Best model:             {}", p.best_model);
            println!("Confidence:             {}", color_confidence(p.confidence));
            println!("Snapshot:               v{}", response.snapshot_version);
            if response.unknown_vm {
                print_warning("VM was not seen during training");
            }
            println!();

            let o = &response.objectives;
            println!("{}", "Objectives".bold());
            println!("{}", "-".repeat(50));
            println!("Cost:                   {:.2}", o.cost);
            println!("Energy:                 {:.2}", o.energy);
            println!("Load balance:           {:.2}", o.load_balance);
            println!("Weighted score:         {:.3}", o.weighted_score);
            println!();

            let rows: Vec<ModelPredictionRow> = response
                .all_predictions
                .iter()
                .map(|(model, value)| ModelPredictionRow {
                    model: model.clone(),
                    output: format!("{:.3}", value),
                })
                .collect();
            print_table(&rows);
        }
    }
    Ok(())
}

/// Read a `{hosts, vm, weights?}` document
pub fn read_score_request(path: &Path) -> Result<ScoreHostsRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).context("Failed to parse host scoring request")
}

/// Score candidate hosts for a VM demand
pub async fn score_hosts(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let request = read_score_request(file)?;
    let response: ScoreHostsResponse = client.post("api/ml/score-hosts", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => match (&response.best_host, response.score) {
            (Some(host), Some(score)) => {
                println!("{} {} (score {:.4})", "Best host:".bold(), host.green().bold(), score)
            }
            (Some(host), None) => println!("{} {}", "Best host:".bold(), host.green().bold()),
            (None, _) => print_warning("No suitable host"),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_weights_omitted_when_unset() {
        let request = build_request(50.0, 8.0, 1.5, 200.0, "VM1".into(), [None, None, None]);
        assert!(request.weights.is_none());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("weights").is_none());
    }

    #[test]
    fn test_partial_weights_default_to_zero() {
        let request = build_request(50.0, 8.0, 1.5, 200.0, "VM1".into(), [Some(1.0), None, None]);
        let weights = request.weights.unwrap();
        assert_eq!(weights.cost, 1.0);
        assert_eq!(weights.energy, 0.0);
        assert_eq!(weights.load, 0.0);
    }

    #[test]
    fn test_read_score_request() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts.json");
        std::fs::write(
            &path,
            r#"{
                "hosts": [{"host_id": "H1", "cpu_capacity": 64, "ram_capacity": 128, "energy": 0.5, "cost": 0.4}],
                "vm": {"cpu_demand": 8, "ram_demand": 16}
            }"#,
        )
        .unwrap();
        let request = read_score_request(&path).unwrap();
        assert_eq!(request.hosts.len(), 1);
        assert!(request.weights.is_none());
        assert!(read_score_request(&dir.path().join("missing.json")).is_err());
    }
}
