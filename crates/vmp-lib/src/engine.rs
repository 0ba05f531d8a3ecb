//! Placement engine
//!
//! Owns the pipeline configuration, the model registry and the snapshot
//! store. Training and tuning runs are serialized; predictions read the
//! current snapshot and never wait on a run.

use crate::dataset::{load_or_generate, DatasetConfig, DatasetSource, DatasetSummary};
use crate::error::{PlacementError, Result};
use crate::estimators::Regressor;
use crate::models::{ModelMetrics, PlacementRequest, PredictionResult};
use crate::observability::{PlacementMetrics, StructuredLogger};
use crate::predictor;
use crate::registry::ModelRegistry;
use crate::snapshot::{ModelSnapshot, SnapshotPersister, SnapshotStore, DEFAULT_VERSIONS_TO_KEEP};
use crate::trainer::{
    train_all, tune_hyperparameters, ModelTuning, PreparedData, TrainingSummary, TuningConfig,
    DEFAULT_TEST_FRACTION,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

/// Settings of the training and serving pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    pub test_fraction: f64,
    /// Seed for the split, cross-validation and every model
    pub seed: u64,
    pub tuning: TuningConfig,
    pub svr_max_train_samples: usize,
    pub model_dir: PathBuf,
    pub versions_to_keep: usize,
    pub persist_snapshots: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: 42,
            tuning: TuningConfig::default(),
            svr_max_train_samples: 1000,
            model_dir: PathBuf::from("models"),
            versions_to_keep: DEFAULT_VERSIONS_TO_KEEP,
            persist_snapshots: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeOutcome {
    #[serde(flatten)]
    pub summary: TrainingSummary,
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneOutcome {
    pub updated_results: BTreeMap<String, ModelMetrics>,
    pub tuning: BTreeMap<String, ModelTuning>,
    pub skipped: Vec<String>,
    pub failures: BTreeMap<String, String>,
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub model_name: String,
    pub mse: f64,
    pub r2_score: f64,
    pub mae: f64,
    pub best_model: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub performance_metrics: Vec<PerformanceRow>,
    pub best_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

pub struct PlacementEngine {
    config: PipelineConfig,
    registry: ModelRegistry,
    store: SnapshotStore,
    persister: Option<SnapshotPersister>,
    /// Data of the last run; the lock also serializes runs
    last_run: Mutex<Option<Arc<PreparedData>>>,
    metrics: PlacementMetrics,
    logger: StructuredLogger,
}

impl PlacementEngine {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let registry = ModelRegistry::new(config.seed, config.svr_max_train_samples);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: PipelineConfig, registry: ModelRegistry) -> Result<Self> {
        if !(config.test_fraction > 0.0 && config.test_fraction < 1.0) {
            return Err(PlacementError::Config(format!(
                "test_fraction must be in (0, 1), got {}",
                config.test_fraction
            )));
        }
        config.tuning.validate()?;
        let persister = if config.persist_snapshots {
            Some(SnapshotPersister::new(&config.model_dir, config.versions_to_keep)?)
        } else {
            None
        };
        let store = SnapshotStore::new();
        if let Some(persister) = &persister {
            store.reserve_through(persister.latest_version()?);
        }
        Ok(Self {
            config,
            registry,
            store,
            persister,
            last_run: Mutex::new(None),
            metrics: PlacementMetrics::new(),
            logger: StructuredLogger::new("vmp"),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn current(&self) -> Option<Arc<ModelSnapshot>> {
        self.store.current()
    }

    pub fn snapshot_version(&self) -> u64 {
        self.store.version()
    }

    pub fn is_initialized(&self) -> bool {
        self.current().map_or(false, |s| s.best_model.is_some())
    }

    fn snapshot(&self) -> Result<Arc<ModelSnapshot>> {
        self.current().ok_or(PlacementError::NotTrained)
    }

    fn load_dataset(&self) -> Result<(crate::models::Dataset, DatasetSource)> {
        let (dataset, source) = load_or_generate(&self.config.dataset)?;
        let label = match source {
            DatasetSource::File => "file",
            DatasetSource::Synthetic => "synthetic",
        };
        self.logger.log_dataset_loaded(label, dataset.len());
        Ok((dataset, source))
    }

    fn install(&self, snapshot: ModelSnapshot, run: &str, failures: usize, started: Instant) -> Arc<ModelSnapshot> {
        let snapshot = self.store.publish(snapshot);
        let persisted = match &self.persister {
            Some(persister) => match persister.save(&snapshot) {
                Ok(_) => true,
                Err(e) => {
                    warn!(version = snapshot.version, error = %e, "Failed to persist snapshot");
                    false
                }
            },
            None => false,
        };

        let duration = started.elapsed().as_secs_f64();
        let best_r2 = snapshot.best_entry().and_then(|e| e.metrics).map_or(f64::NAN, |m| m.r2);
        self.metrics.observe_training_duration(duration);
        self.metrics.set_models_trained(snapshot.trained_count());
        self.metrics
            .set_snapshot(snapshot.version, snapshot.best_model.as_deref(), best_r2);
        self.logger.log_training_completed(
            run,
            snapshot.trained_count(),
            failures,
            snapshot.best_model.as_deref(),
            duration,
        );
        self.logger.log_snapshot_published(snapshot.version, persisted);
        snapshot
    }

    /// Load the dataset, train every model and publish a new snapshot
    pub fn initialize(&self) -> Result<InitializeOutcome> {
        let mut last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();

        let (dataset, _) = self.load_dataset()?;
        let data = PreparedData::prepare(&dataset, self.config.test_fraction, self.config.seed)?;
        let report = train_all(&self.registry, &data);
        for model in report.failures.keys() {
            self.metrics.inc_fit_failures(model);
        }
        if report.trained_count() == 0 {
            return Err(PlacementError::fit("all models", "no model could be trained"));
        }

        let summary = report.summary();
        let snapshot = ModelSnapshot::new(report.entries, &data, DatasetSummary::describe(&dataset));
        let snapshot = self.install(snapshot, "initialize", summary.failures.len(), started);
        *last_run = Some(Arc::new(data));

        Ok(InitializeOutcome {
            summary,
            snapshot_version: snapshot.version,
        })
    }

    /// Grid-search the current models and publish the tuned snapshot
    pub fn tune(&self) -> Result<TuneOutcome> {
        let mut last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot()?;
        let started = Instant::now();

        let data = match last_run.as_ref() {
            Some(data) => Arc::clone(data),
            None => {
                // Restored snapshots carry no training matrices
                let (dataset, _) = self.load_dataset()?;
                let data = Arc::new(PreparedData::prepare(
                    &dataset,
                    self.config.test_fraction,
                    self.config.seed,
                )?);
                *last_run = Some(Arc::clone(&data));
                data
            }
        };
        ensure_same_features(&current, &data)?;

        let report = tune_hyperparameters(&self.registry, &current.entries, &data, &self.config.tuning)?;
        for model in report.failures.keys() {
            self.metrics.inc_fit_failures(model);
        }

        let snapshot = ModelSnapshot::new(report.entries, &data, current.dataset.clone());
        let updated_results = snapshot.results();
        let snapshot = self.install(snapshot, "tune", report.failures.len(), started);

        Ok(TuneOutcome {
            updated_results,
            tuning: report.tuned,
            skipped: report.skipped,
            failures: report.failures,
            snapshot_version: snapshot.version,
        })
    }

    pub fn predict(&self, request: &PlacementRequest) -> Result<PredictionResult> {
        let started = Instant::now();
        let outcome = self
            .snapshot()
            .and_then(|snapshot| predictor::predict(&snapshot, request));
        self.metrics
            .observe_prediction_latency(started.elapsed().as_secs_f64());

        match &outcome {
            Ok(result) => {
                self.metrics.inc_predictions_generated();
                self.logger.log_prediction(
                    &request.vm,
                    &result.prediction.recommended_host,
                    &result.prediction.best_model,
                    result.prediction.confidence,
                    result.unknown_vm,
                    result.snapshot_version,
                );
            }
            Err(_) => self.metrics.inc_prediction_errors(),
        }
        outcome
    }

    pub fn results(&self) -> Result<BTreeMap<String, ModelMetrics>> {
        Ok(self.snapshot()?.results())
    }

    /// Trained models sorted by R², best first
    pub fn performance(&self) -> Result<PerformanceReport> {
        let snapshot = self.snapshot()?;
        let mut rows: Vec<PerformanceRow> = snapshot
            .entries
            .iter()
            .filter_map(|e| {
                e.metrics.map(|m| PerformanceRow {
                    model_name: e.name.clone(),
                    mse: m.mse,
                    r2_score: m.r2,
                    mae: m.mae,
                    best_model: snapshot.best_model.as_deref() == Some(e.name.as_str()),
                })
            })
            .collect();
        // Stable sort keeps registry order among equal scores; NaN sorts last
        rows.sort_by(|a, b| {
            let key = |r: f64| if r.is_nan() { f64::NEG_INFINITY } else { r };
            key(b.r2_score).total_cmp(&key(a.r2_score))
        });
        Ok(PerformanceReport {
            performance_metrics: rows,
            best_model: snapshot.best_model.clone(),
        })
    }

    /// Importances of `model`'s features, largest first
    ///
    /// Models without feature importances return an empty list.
    pub fn feature_importance(&self, model: &str) -> Result<Vec<FeatureImportance>> {
        let snapshot = self.snapshot()?;
        let entry = snapshot
            .entry(model)
            .ok_or_else(|| PlacementError::Config(format!("unknown model: {}", model)))?;
        if !entry.trained {
            return Err(PlacementError::fit(model, "model is not trained in the current snapshot"));
        }
        let Some(importances) = entry.estimator.feature_importances() else {
            return Ok(Vec::new());
        };
        let mut out: Vec<FeatureImportance> = snapshot
            .feature_names
            .iter()
            .zip(importances)
            .map(|(feature, importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        out.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        Ok(out)
    }

    /// Summary of the training dataset, or of the configured dataset before any run
    pub fn dataset_info(&self) -> Result<DatasetSummary> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot.dataset.clone());
        }
        let (dataset, _) = self.load_dataset()?;
        Ok(DatasetSummary::describe(&dataset))
    }

    /// VM names the current encoder knows, sorted
    pub fn known_vms(&self) -> Result<Vec<String>> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot.known_vms().to_vec());
        }
        let (dataset, _) = self.load_dataset()?;
        let mut vms: Vec<String> = dataset.samples.into_iter().map(|s| s.vm).collect();
        vms.sort();
        vms.dedup();
        Ok(vms)
    }

    /// Install the newest verified snapshot from the model directory
    pub fn restore_from_disk(&self) -> Result<Option<u64>> {
        let Some(persister) = &self.persister else {
            return Ok(None);
        };
        let mut last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(snapshot) = persister.load_latest()? else {
            info!(dir = %persister.dir().display(), "No persisted snapshot found");
            return Ok(None);
        };
        let snapshot = self.store.restore(snapshot);
        *last_run = None;
        let best_r2 = snapshot.best_entry().and_then(|e| e.metrics).map_or(f64::NAN, |m| m.r2);
        self.metrics.set_models_trained(snapshot.trained_count());
        self.metrics
            .set_snapshot(snapshot.version, snapshot.best_model.as_deref(), best_r2);
        self.logger.log_snapshot_restored(snapshot.version);
        Ok(Some(snapshot.version))
    }
}

/// Tuned and untuned entries of one snapshot must share encoders, scaler and split
fn ensure_same_features(current: &ModelSnapshot, data: &PreparedData) -> Result<()> {
    if current.builder != data.builder || current.scaler != data.scaler || current.split != data.summary() {
        return Err(PlacementError::Config(format!(
            "dataset changed since snapshot v{} was trained; run initialize before tuning",
            current.version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DECISION_TREE, KNN, RANDOM_FOREST};
    use tempfile::TempDir;

    fn config(dir: &TempDir, persist: bool) -> PipelineConfig {
        PipelineConfig {
            dataset: DatasetConfig {
                path: dir.path().join("vm_metrics.csv"),
                synthetic_samples: 200,
                seed: 42,
                cache_synthetic: true,
            },
            model_dir: dir.path().join("models"),
            persist_snapshots: persist,
            ..Default::default()
        }
    }

    fn engine(dir: &TempDir, persist: bool) -> PlacementEngine {
        let registry = ModelRegistry::default()
            .only(&[RANDOM_FOREST, KNN, DECISION_TREE])
            .unwrap();
        PlacementEngine::with_registry(config(dir, persist), registry).unwrap()
    }

    #[test]
    fn test_queries_before_initialize_are_not_trained() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, false);
        let request = PlacementRequest::new(50.0, 8.0, 1.5, 200.0, "VM1");
        assert!(matches!(engine.predict(&request), Err(PlacementError::NotTrained)));
        assert!(matches!(engine.results(), Err(PlacementError::NotTrained)));
        assert!(matches!(engine.tune(), Err(PlacementError::NotTrained)));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_initialize_then_predict() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, false);
        let outcome = engine.initialize().unwrap();
        assert_eq!(outcome.summary.models_trained, 3);
        assert_eq!(outcome.snapshot_version, 1);
        assert!(dir.path().join("vm_metrics.csv").exists());

        let result = engine.predict(&PlacementRequest::new(20.0, 4.0, 1.0, 150.0, "VM2")).unwrap();
        assert_eq!(result.snapshot_version, 1);
        assert_eq!(result.all_predictions.len(), 3);
        assert!(engine.known_vms().unwrap().contains(&"VM2".to_string()));
    }

    #[test]
    fn test_performance_sorted_and_flags_best() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, false);
        engine.initialize().unwrap();
        let report = engine.performance().unwrap();
        let scores: Vec<f64> = report.performance_metrics.iter().map(|r| r.r2_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert!(report.performance_metrics[0].best_model);
        assert_eq!(report.best_model.as_deref(), Some(report.performance_metrics[0].model_name.as_str()));
    }

    #[test]
    fn test_feature_importance() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, false);
        engine.initialize().unwrap();

        let forest = engine.feature_importance(RANDOM_FOREST).unwrap();
        assert_eq!(forest.len(), crate::features::NUM_FEATURES);
        assert!(forest.windows(2).all(|w| w[0].importance >= w[1].importance));
        assert!(engine.feature_importance(KNN).unwrap().is_empty());
        assert!(matches!(
            engine.feature_importance("Linear Regression"),
            Err(PlacementError::Config(_))
        ));
    }

    #[test]
    fn test_retraining_bumps_version() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, false);
        engine.initialize().unwrap();
        let first = engine.results().unwrap();
        assert_eq!(engine.initialize().unwrap().snapshot_version, 2);
        assert_eq!(engine.results().unwrap(), first);
    }

    #[test]
    fn test_restore_from_disk() {
        let dir = TempDir::new().unwrap();
        let trained = engine(&dir, true);
        trained.initialize().unwrap();
        let request = PlacementRequest::new(70.0, 20.0, 2.0, 250.0, "VM5");
        let expected = trained.predict(&request).unwrap();

        let restored = engine(&dir, true);
        assert_eq!(restored.restore_from_disk().unwrap(), Some(1));
        assert_eq!(restored.predict(&request).unwrap(), expected);
        assert_eq!(restored.results().unwrap(), trained.results().unwrap());
    }

    #[test]
    fn test_restore_with_empty_model_dir() {
        let dir = TempDir::new().unwrap();
        let persisted = engine(&dir, true);
        assert_eq!(persisted.restore_from_disk().unwrap(), None);
        assert!(persisted.current().is_none());
        assert_eq!(engine(&dir, false).restore_from_disk().unwrap(), None);
    }

    #[test]
    fn test_versions_continue_after_restart_without_restore() {
        let dir = TempDir::new().unwrap();
        let first = engine(&dir, true);
        first.initialize().unwrap();
        first.initialize().unwrap();

        let second = engine(&dir, true);
        assert_eq!(second.snapshot_version(), 0);
        assert_eq!(second.initialize().unwrap().snapshot_version, 3);
        let manifest = SnapshotPersister::new(dir.path().join("models"), 5).unwrap().manifest().unwrap();
        let versions: Vec<u64> = manifest.versions.iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    fn tuning_engine(dir: &TempDir) -> PlacementEngine {
        let mut config = config(dir, true);
        config.tuning.max_combinations = 4;
        let registry = ModelRegistry::default().only(&[KNN, DECISION_TREE]).unwrap();
        PlacementEngine::with_registry(config, registry).unwrap()
    }

    #[test]
    fn test_tune_after_restore_with_same_dataset() {
        let dir = TempDir::new().unwrap();
        tuning_engine(&dir).initialize().unwrap();

        let restored = tuning_engine(&dir);
        restored.restore_from_disk().unwrap();
        let outcome = restored.tune().unwrap();
        assert_eq!(outcome.snapshot_version, 2);
        assert!(outcome.tuning.contains_key(KNN));
    }

    #[test]
    fn test_tune_after_restore_rejects_changed_dataset() {
        let dir = TempDir::new().unwrap();
        tuning_engine(&dir).initialize().unwrap();
        crate::dataset::save(&dir.path().join("vm_metrics.csv"), &crate::dataset::generate(300, 7)).unwrap();

        let restored = tuning_engine(&dir);
        restored.restore_from_disk().unwrap();
        let before = restored.current().unwrap();
        assert!(matches!(restored.tune(), Err(PlacementError::Config(_))));
        // The restored snapshot stays in place
        assert_eq!(restored.snapshot_version(), 1);
        assert_eq!(restored.current().unwrap(), before);

        // Retraining on the new file makes tuning possible again
        restored.initialize().unwrap();
        assert!(restored.tune().is_ok());
    }

    #[test]
    fn test_dataset_info_before_training() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, false);
        let info = engine.dataset_info().unwrap();
        assert_eq!(info.rows, 200);
        assert_eq!(engine.known_vms().unwrap().len(), 10);
    }
}
