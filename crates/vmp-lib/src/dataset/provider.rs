//! Dataset loading, synthesis and caching
//!
//! A dataset is read from a CSV file when one exists; otherwise a synthetic
//! dataset is generated from fixed distributions and written back to the
//! same path so later runs see identical data.

use crate::error::{PlacementError, Result};
use crate::models::{Dataset, Sample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default number of synthetic samples
pub const DEFAULT_SYNTHETIC_SAMPLES: usize = 10_000;

/// Default seed for synthetic generation
pub const DEFAULT_SEED: u64 = 42;

/// Number of distinct synthetic VMs
const SYNTHETIC_VM_COUNT: usize = 10;

/// Columns written when caching a dataset
pub const DATASET_COLUMNS: [&str; 6] = ["cpu_usage", "memory", "network_io", "power", "vm", "host"];

/// Configuration for the dataset provider
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// CSV file to load, or to write the synthetic dataset to
    pub path: PathBuf,
    /// Rows to synthesize when no file is available
    pub synthetic_samples: usize,
    /// Seed for synthetic generation
    pub seed: u64,
    /// Write the synthetic dataset to `path` when the file is absent
    pub cache_synthetic: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vm_metrics.csv"),
            synthetic_samples: DEFAULT_SYNTHETIC_SAMPLES,
            seed: DEFAULT_SEED,
            cache_synthetic: true,
        }
    }
}

/// Where a dataset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSource {
    File,
    Synthetic,
}

/// Load the dataset at `config.path`, falling back to synthetic data
///
/// A malformed file is left untouched; only an absent file is replaced by
/// the cached synthetic dataset.
pub fn load_or_generate(config: &DatasetConfig) -> Result<(Dataset, DatasetSource)> {
    if config.path.exists() {
        match load(&config.path) {
            Ok(dataset) => {
                info!(
                    path = %config.path.display(),
                    rows = dataset.len(),
                    "Dataset loaded"
                );
                return Ok((dataset, DatasetSource::File));
            }
            Err(e) => {
                warn!(
                    path = %config.path.display(),
                    error = %e,
                    "Dataset file unusable, generating synthetic data"
                );
                return Ok((generate(config.synthetic_samples, config.seed), DatasetSource::Synthetic));
            }
        }
    }

    info!(
        path = %config.path.display(),
        samples = config.synthetic_samples,
        seed = config.seed,
        "Dataset not found, generating synthetic data"
    );
    let dataset = generate(config.synthetic_samples, config.seed);

    if config.cache_synthetic {
        save(&config.path, &dataset)?;
        info!(path = %config.path.display(), "Synthetic dataset cached");
    }

    Ok((dataset, DatasetSource::Synthetic))
}

/// Strictly load a CSV dataset
pub fn load(path: &Path) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let has = |name: &str| headers.iter().any(|h| h == name);
    let mut missing: Vec<&str> = DATASET_COLUMNS
        .iter()
        .copied()
        .filter(|c| !has(c))
        .collect();
    // `cpu` is accepted in place of `cpu_usage`
    if has("cpu") {
        missing.retain(|c| *c != "cpu_usage");
    }
    if !missing.is_empty() {
        return Err(PlacementError::DataFormat(format!(
            "missing columns: {}",
            missing.join(", ")
        )));
    }

    let mut samples = Vec::new();
    for (line, record) in reader.deserialize::<Sample>().enumerate() {
        let sample = record.map_err(|e| {
            PlacementError::DataFormat(format!("row {}: {}", line + 1, e))
        })?;
        validate_sample(&sample, line + 1)?;
        samples.push(sample);
    }

    if samples.is_empty() {
        return Err(PlacementError::DataFormat("dataset has no rows".to_string()));
    }

    Ok(Dataset::new(samples))
}

fn validate_sample(sample: &Sample, line: usize) -> Result<()> {
    let numeric = [
        ("cpu_usage", sample.cpu_usage),
        ("memory", sample.memory),
        ("network_io", sample.network_io),
        ("power", sample.power),
    ];
    if let Some((name, _)) = numeric.iter().find(|(_, v)| !v.is_finite()) {
        return Err(PlacementError::DataFormat(format!(
            "row {}: {} is not a finite number",
            line, name
        )));
    }
    if sample.vm.is_empty() || sample.host.is_empty() {
        return Err(PlacementError::DataFormat(format!(
            "row {}: vm and host must not be empty",
            line
        )));
    }
    Ok(())
}

/// Write a dataset as CSV, via a temp file and rename
pub fn save(path: &Path, dataset: &Dataset) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    {
        let file = File::create(&temp_path)?;
        let mut writer = csv::Writer::from_writer(file);
        for sample in &dataset.samples {
            writer.serialize(sample)?;
        }
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Generate a synthetic dataset
///
/// Hosts follow a capacity rule: small VMs on Host1, medium on Host2,
/// everything else on Host3.
pub fn generate(n_samples: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let samples = (0..n_samples)
        .map(|i| {
            let cpu = rng.gen_range(10..=90) as f64;
            let memory = rng.gen_range(1..=32) as f64;
            let network_io = rng.gen_range(0.1..5.0);
            let power = rng.gen_range(100..=300) as f64;
            Sample {
                cpu_usage: cpu,
                memory,
                network_io,
                power,
                vm: format!("VM{}", i % SYNTHETIC_VM_COUNT + 1),
                host: assign_host(cpu, memory).to_string(),
            }
        })
        .collect();
    Dataset::new(samples)
}

/// Host assignment rule used for synthetic data
pub fn assign_host(cpu: f64, memory: f64) -> &'static str {
    if cpu <= 33.0 && memory <= 11.0 {
        "Host1"
    } else if cpu <= 66.0 && memory <= 22.0 {
        "Host2"
    } else {
        "Host3"
    }
}
