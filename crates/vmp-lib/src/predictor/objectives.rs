//! Proxy cost, energy and load-balance objectives

use crate::error::{PlacementError, Result};
use crate::models::{ObjectiveWeights, Objectives};

/// Cost at which the normalized cost saturates
const COST_SCALE: f64 = 200.0;
/// Energy at which the normalized energy saturates
const ENERGY_SCALE: f64 = 300.0;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Reject negative, non-finite or all-zero weights
pub fn validate_weights(weights: &ObjectiveWeights) -> Result<()> {
    let all = [weights.cost, weights.energy, weights.load];
    if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(PlacementError::Config(
            "objective weights must be finite and non-negative".into(),
        ));
    }
    if all.iter().all(|w| *w == 0.0) {
        return Err(PlacementError::Config("objective weights must not all be zero".into()));
    }
    Ok(())
}

/// Objectives of placing a VM with the given resource usage
pub fn compute_objectives(
    cpu: f64,
    memory: f64,
    network_io: f64,
    power: f64,
    weights: ObjectiveWeights,
) -> Result<Objectives> {
    validate_weights(&weights)?;

    let cost = round_to(power * 0.12 + cpu * 0.05 + (network_io - 1.0).max(0.0) * 0.5, 2);
    let energy = round_to(power * 0.9 + cpu * 0.2, 2);
    let load_balance = round_to(100.0 - (cpu - memory.min(100.0)).abs().min(100.0), 2);

    let norm_cost = (cost / COST_SCALE).min(1.0);
    let norm_energy = (energy / ENERGY_SCALE).min(1.0);
    let norm_load = 1.0 - (load_balance / 100.0).min(1.0);
    let weighted_score = round_to(
        weights.cost * norm_cost + weights.energy * norm_energy + weights.load * norm_load,
        3,
    );

    Ok(Objectives {
        cost,
        energy,
        load_balance,
        weighted_score,
        weights,
    })
}
