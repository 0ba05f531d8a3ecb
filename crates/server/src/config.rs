//! Server configuration

use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::PathBuf;
use vmp_lib::dataset::DatasetConfig;
use vmp_lib::trainer::TuningConfig;
use vmp_lib::PipelineConfig;

/// Server configuration
///
/// Read from `vmp.toml` (optional) and `VMP_*` environment variables,
/// the latter taking precedence.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// CSV dataset; generated synthetically when absent
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Directory for persisted snapshots
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_synthetic_samples")]
    pub synthetic_samples: usize,

    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,

    /// Upper bound on grid combinations evaluated per model
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,

    /// SVR fits on at most this many training rows
    #[serde(default = "default_svr_max_train_samples")]
    pub svr_max_train_samples: usize,

    #[serde(default = "default_versions_to_keep")]
    pub versions_to_keep: usize,

    #[serde(default = "default_true")]
    pub persist_snapshots: bool,

    #[serde(default = "default_true")]
    pub restore_on_start: bool,

    #[serde(default)]
    pub train_on_start: bool,
}

fn default_api_port() -> u16 {
    5001
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("vm_metrics.csv")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_seed() -> u64 {
    42
}

fn default_synthetic_samples() -> usize {
    vmp_lib::dataset::DEFAULT_SYNTHETIC_SAMPLES
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_cv_folds() -> usize {
    3
}

fn default_max_combinations() -> usize {
    64
}

fn default_svr_max_train_samples() -> usize {
    1000
}

fn default_versions_to_keep() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl ServerConfig {
    /// Load configuration from `vmp.toml` and the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("vmp").required(false))
            .add_source(config::Environment::with_prefix("VMP").try_parsing(true))
            .build()?;
        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let parsed: ServerConfig = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            bail!("test_fraction must be in (0, 1), got {}", self.test_fraction);
        }
        if self.synthetic_samples == 0 {
            bail!("synthetic_samples must be positive");
        }
        if self.cv_folds < 2 {
            bail!("cv_folds must be at least 2, got {}", self.cv_folds);
        }
        if self.max_combinations == 0 {
            bail!("max_combinations must be positive");
        }
        if self.svr_max_train_samples == 0 {
            bail!("svr_max_train_samples must be positive");
        }
        if self.versions_to_keep == 0 {
            bail!("versions_to_keep must be positive");
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            dataset: DatasetConfig {
                path: self.dataset_path.clone(),
                synthetic_samples: self.synthetic_samples,
                seed: self.seed,
                cache_synthetic: true,
            },
            test_fraction: self.test_fraction,
            seed: self.seed,
            tuning: TuningConfig {
                cv_folds: self.cv_folds,
                max_combinations: self.max_combinations,
                seed: self.seed,
            },
            svr_max_train_samples: self.svr_max_train_samples,
            model_dir: self.model_dir.clone(),
            versions_to_keep: self.versions_to_keep,
            persist_snapshots: self.persist_snapshots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_config(config::Config::builder().build().unwrap()).unwrap();
        assert_eq!(config.api_port, 5001);
        assert_eq!(config.dataset_path, PathBuf::from("vm_metrics.csv"));
        assert_eq!(config.synthetic_samples, 10_000);
        assert_eq!(config.cv_folds, 3);
        assert!(config.persist_snapshots);
        assert!(config.restore_on_start);
        assert!(!config.train_on_start);
    }

    #[test]
    fn test_overrides_flow_into_pipeline() {
        let source = config::Config::builder()
            .set_override("seed", 7)
            .unwrap()
            .set_override("max_combinations", 8)
            .unwrap()
            .build()
            .unwrap();
        let pipeline = ServerConfig::from_config(source).unwrap().pipeline();
        assert_eq!(pipeline.seed, 7);
        assert_eq!(pipeline.dataset.seed, 7);
        assert_eq!(pipeline.tuning.max_combinations, 8);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let source = config::Config::builder()
            .set_override("test_fraction", 1.5)
            .unwrap()
            .build()
            .unwrap();
        assert!(ServerConfig::from_config(source).is_err());
    }
}
