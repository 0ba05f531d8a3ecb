//! Host recommendation from a trained snapshot

use super::objectives::compute_objectives;
use crate::error::{PlacementError, Result};
use crate::estimators::Regressor;
use crate::models::{PlacementRequest, PredictionResult, Recommendation};
use crate::snapshot::ModelSnapshot;
use ndarray::Axis;
use std::collections::BTreeMap;
use tracing::{debug, warn};

fn validate_request(request: &PlacementRequest) -> Result<()> {
    let fields = [
        ("cpu", request.cpu),
        ("memory", request.memory),
        ("network_io", request.network_io),
        ("power", request.power),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
        return Err(PlacementError::Config(format!("{} must be a finite number", name)));
    }
    if let Some((name, _)) = fields.iter().find(|(_, v)| *v < 0.0) {
        return Err(PlacementError::Config(format!("{} must not be negative", name)));
    }
    Ok(())
}

/// Run every trained model of `snapshot` on `request`
///
/// The best model's output is rounded and clamped to the nearest host
/// code. Confidence is that model's test R², clamped to `[0, 1]`.
pub fn predict(snapshot: &ModelSnapshot, request: &PlacementRequest) -> Result<PredictionResult> {
    validate_request(request)?;
    let objectives = compute_objectives(
        request.cpu,
        request.memory,
        request.network_io,
        request.power,
        request.weights.unwrap_or_default(),
    )?;
    let best = snapshot.best_entry().ok_or(PlacementError::NotTrained)?;

    let (row, known_vm) = snapshot.builder.request_row(request);
    if !known_vm {
        debug!(vm = %request.vm, "Unknown VM mapped to reserved code");
    }
    let raw = row.insert_axis(Axis(0));
    let scaled = snapshot.scaler.transform(raw.view());

    let mut all_predictions = BTreeMap::new();
    for entry in snapshot.entries.iter().filter(|e| e.trained) {
        let x = if entry.scaled { scaled.view() } else { raw.view() };
        match entry.estimator.predict(x) {
            Ok(pred) if pred.len() == 1 && pred[0].is_finite() => {
                all_predictions.insert(entry.name.clone(), pred[0]);
            }
            Ok(_) => warn!(model = %entry.name, "Model returned an unusable prediction"),
            Err(e) if entry.name == best.name => return Err(e),
            Err(e) => warn!(model = %entry.name, error = %e, "Model prediction failed"),
        }
    }

    let value = all_predictions
        .get(&best.name)
        .copied()
        .ok_or_else(|| PlacementError::fit(&best.name, "best model returned no prediction"))?;
    let host = snapshot.builder.host_encoder().nearest_class(value)?;
    let confidence = best
        .metrics
        .map(|m| m.r2)
        .filter(|r| r.is_finite())
        .map_or(0.0, |r| r.clamp(0.0, 1.0));

    Ok(PredictionResult {
        prediction: Recommendation {
            recommended_host: host.to_string(),
            best_model: best.name.clone(),
            confidence,
        },
        all_predictions,
        objectives,
        unknown_vm: !known_vm,
        snapshot_version: snapshot.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetSummary;
    use crate::models::{Dataset, ObjectiveWeights, Sample};
    use crate::dataset::generate;
    use crate::registry::{ModelRegistry, DECISION_TREE, RANDOM_FOREST};
    use crate::snapshot::test_support::trained_snapshot;
    use crate::trainer::{train_all, PreparedData};

    fn sample(cpu: f64, memory: f64, network_io: f64, power: f64, vm: &str, host: &str) -> Sample {
        Sample {
            cpu_usage: cpu,
            memory,
            network_io,
            power,
            vm: vm.to_string(),
            host: host.to_string(),
        }
    }

    #[test]
    fn test_three_sample_tree_reproduces_labels() {
        let dataset = Dataset::new(vec![
            sample(10.0, 2.0, 0.5, 120.0, "VM1", "H1"),
            sample(90.0, 30.0, 4.8, 290.0, "VM2", "H2"),
            sample(50.0, 16.0, 2.5, 200.0, "VM3", "H1"),
        ]);
        let data = PreparedData::prepare(&dataset, 0.2, 42).unwrap();
        let registry = ModelRegistry::default().only(&[DECISION_TREE]).unwrap();
        let report = train_all(&registry, &data);
        let snapshot = ModelSnapshot::new(report.entries, &data, DatasetSummary::describe(&dataset));

        for s in &dataset.samples {
            let request = PlacementRequest::new(s.cpu_usage, s.memory, s.network_io, s.power, s.vm.clone());
            let result = predict(&snapshot, &request).unwrap();
            assert_eq!(result.prediction.recommended_host, s.host);
            assert_eq!(result.prediction.best_model, DECISION_TREE);
            assert_eq!(result.prediction.confidence, 1.0);
        }
    }

    #[test]
    fn test_training_rows_predict_near_their_label() {
        let dataset = generate(200, 42);
        let data = PreparedData::prepare(&dataset, 0.2, 42).unwrap();
        let registry = ModelRegistry::default()
            .only(&[RANDOM_FOREST, DECISION_TREE])
            .unwrap();
        let report = train_all(&registry, &data);
        let snapshot = ModelSnapshot::new(report.entries, &data, DatasetSummary::describe(&dataset));
        let hosts = snapshot.builder.host_encoder();

        let mut forest_error = 0.0;
        for &i in &data.split.train {
            let s = &dataset.samples[i];
            let request = PlacementRequest::new(s.cpu_usage, s.memory, s.network_io, s.power, s.vm.clone());
            let result = predict(&snapshot, &request).unwrap();
            let label = hosts.transform(&s.host).unwrap() as f64;
            assert!((result.all_predictions[DECISION_TREE] - label).abs() < 1e-9);
            forest_error += (result.all_predictions[RANDOM_FOREST] - label).abs();
        }
        assert!(forest_error / (data.split.train.len() as f64) < 0.5);
    }

    #[test]
    fn test_predict_is_idempotent() {
        let snapshot = trained_snapshot();
        let request = PlacementRequest::new(50.0, 8.0, 1.5, 200.0, "VM3");
        assert_eq!(
            predict(&snapshot, &request).unwrap(),
            predict(&snapshot, &request).unwrap()
        );
    }

    #[test]
    fn test_boundary_inputs() {
        let snapshot = trained_snapshot();
        let hosts = snapshot.hosts().to_vec();
        for (cpu, memory, power) in [(0.0, 0.0, 100.0), (100.0, 0.0, 100.0), (100.0, 32.0, 300.0)] {
            let request = PlacementRequest::new(cpu, memory, 0.1, power, "VM1");
            let result = predict(&snapshot, &request).unwrap();
            assert!(hosts.contains(&result.prediction.recommended_host));
            assert!((0.0..=1.0).contains(&result.prediction.confidence));
        }
    }

    #[test]
    fn test_unknown_vm_is_flagged() {
        let snapshot = trained_snapshot();
        let request = PlacementRequest::new(50.0, 8.0, 1.5, 200.0, "VM-unseen");
        let result = predict(&snapshot, &request).unwrap();
        assert!(result.unknown_vm);
        assert!(!result.all_predictions.is_empty());
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let snapshot = trained_snapshot();
        let request = PlacementRequest::new(f64::NAN, 8.0, 1.5, 200.0, "VM1");
        assert!(matches!(predict(&snapshot, &request), Err(PlacementError::Config(_))));
    }

    #[test]
    fn test_negative_input_rejected() {
        let snapshot = trained_snapshot();
        for request in [
            PlacementRequest::new(-1.0, 8.0, 1.5, 200.0, "VM1"),
            PlacementRequest::new(50.0, -8.0, 1.5, 200.0, "VM1"),
            PlacementRequest::new(50.0, 8.0, 1.5, -200.0, "VM1"),
        ] {
            assert!(matches!(predict(&snapshot, &request), Err(PlacementError::Config(_))));
        }
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let snapshot = trained_snapshot();
        let mut request = PlacementRequest::new(50.0, 8.0, 1.5, 200.0, "VM1");
        request.weights = Some(ObjectiveWeights {
            cost: -1.0,
            energy: 0.5,
            load: 0.5,
        });
        assert!(matches!(predict(&snapshot, &request), Err(PlacementError::Config(_))));
    }

    #[test]
    fn test_untrained_snapshot_is_not_trained() {
        let mut snapshot = trained_snapshot();
        snapshot.best_model = None;
        let request = PlacementRequest::new(50.0, 8.0, 1.5, 200.0, "VM1");
        assert!(matches!(predict(&snapshot, &request), Err(PlacementError::NotTrained)));
    }
}
