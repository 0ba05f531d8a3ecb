//! Rule-based host scoring

use crate::models::{HostProfile, HostScoreWeights, VmDemand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredHost {
    pub host_id: String,
    pub score: f64,
}

/// Lowest-scoring host that can fit `vm`, or `None` if none can
///
/// Hosts with less CPU or RAM capacity than the VM demands, or with no
/// CPU capacity at all, are skipped. Earlier hosts win ties.
pub fn score_hosts(
    hosts: &[HostProfile],
    vm: &VmDemand,
    weights: &HostScoreWeights,
) -> Option<ScoredHost> {
    let mut best: Option<ScoredHost> = None;
    for host in hosts {
        if host.cpu_capacity <= 0.0
            || host.cpu_capacity < vm.cpu_demand
            || host.ram_capacity < vm.ram_demand
        {
            continue;
        }
        let score = weights.cpu * (vm.cpu_demand / host.cpu_capacity)
            + weights.energy * host.energy
            + weights.cost * host.cost;
        if !score.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |b| score < b.score) {
            best = Some(ScoredHost {
                host_id: host.host_id.clone(),
                score,
            });
        }
    }
    best
}
