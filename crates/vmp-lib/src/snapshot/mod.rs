//! Versioned model snapshots
//!
//! A snapshot is the immutable result of one training or tuning run.
//! Readers clone the current `Arc` and never see a half-trained state;
//! writers publish a complete snapshot in a single swap.

mod persist;

pub use persist::{ManifestEntry, SnapshotManifest, SnapshotPersister, DEFAULT_VERSIONS_TO_KEEP};

use crate::dataset::DatasetSummary;
use crate::features::{FeatureBuilder, StandardScaler};
use crate::models::ModelMetrics;
use crate::registry::ModelEntry;
use crate::trainer::{best_model, collect_results, PreparedData, SplitSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Trained models plus everything needed to serve predictions with them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Assigned by [`SnapshotStore::publish`]; 0 until published
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<ModelEntry>,
    pub best_model: Option<String>,
    pub feature_names: Vec<String>,
    pub builder: FeatureBuilder,
    pub scaler: StandardScaler,
    pub split: SplitSummary,
    pub dataset: DatasetSummary,
}

impl ModelSnapshot {
    pub fn new(entries: Vec<ModelEntry>, data: &PreparedData, dataset: DatasetSummary) -> Self {
        let best_model = best_model(&entries).map(str::to_string);
        Self {
            version: 0,
            created_at: Utc::now(),
            entries,
            best_model,
            feature_names: data.builder.feature_names(),
            builder: data.builder.clone(),
            scaler: data.scaler.clone(),
            split: data.summary(),
            dataset,
        }
    }

    pub fn entry(&self, name: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn best_entry(&self) -> Option<&ModelEntry> {
        self.best_model.as_deref().and_then(|name| self.entry(name))
    }

    pub fn results(&self) -> BTreeMap<String, ModelMetrics> {
        collect_results(&self.entries)
    }

    pub fn trained_count(&self) -> usize {
        self.entries.iter().filter(|e| e.trained).count()
    }

    pub fn known_vms(&self) -> &[String] {
        self.builder.vm_encoder().classes()
    }

    pub fn hosts(&self) -> &[String] {
        self.builder.host_encoder().classes()
    }
}

/// Holder of the current snapshot
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<ModelSnapshot>>>,
    /// Highest version already used, possibly by an earlier process
    floor: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot predictions should use, if any run has completed
    pub fn current(&self) -> Option<Arc<ModelSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.current().map_or(0, |s| s.version)
    }

    /// Never hand out `version` or anything below it
    pub fn reserve_through(&self, version: u64) {
        self.floor.fetch_max(version, Ordering::SeqCst);
    }

    /// Install `snapshot` as the next version
    pub fn publish(&self, mut snapshot: ModelSnapshot) -> Arc<ModelSnapshot> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let last = current.as_ref().map_or(0, |s| s.version);
        snapshot.version = last.max(self.floor.load(Ordering::SeqCst)) + 1;
        self.floor.store(snapshot.version, Ordering::SeqCst);
        let snapshot = Arc::new(snapshot);
        *current = Some(Arc::clone(&snapshot));
        info!(
            version = snapshot.version,
            best_model = ?snapshot.best_model,
            "Snapshot published"
        );
        snapshot
    }

    /// Install a previously published snapshot, keeping its version
    pub fn restore(&self, snapshot: ModelSnapshot) -> Arc<ModelSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        snapshot
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::dataset::{generate, DatasetSummary};
    use crate::registry::{ModelRegistry, DECISION_TREE, KNN};
    use crate::trainer::train_all;

    /// Small trained snapshot for tests that need one
    pub fn trained_snapshot() -> ModelSnapshot {
        let dataset = generate(120, 42);
        let data = PreparedData::prepare(&dataset, 0.2, 42).unwrap();
        let registry = ModelRegistry::default().only(&[KNN, DECISION_TREE]).unwrap();
        let report = train_all(&registry, &data);
        ModelSnapshot::new(report.entries, &data, DatasetSummary::describe(&dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::trained_snapshot;
    use super::*;

    #[test]
    fn test_store_starts_empty() {
        let store = SnapshotStore::new();
        assert!(store.current().is_none());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_publish_increments_version() {
        let store = SnapshotStore::new();
        let snapshot = trained_snapshot();
        assert_eq!(store.publish(snapshot.clone()).version, 1);
        let held = store.current().unwrap();
        assert_eq!(store.publish(snapshot).version, 2);
        // Readers keep the snapshot they already hold
        assert_eq!(held.version, 1);
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_restore_keeps_version() {
        let store = SnapshotStore::new();
        let mut snapshot = trained_snapshot();
        snapshot.version = 7;
        store.restore(snapshot.clone());
        assert_eq!(store.version(), 7);
        assert_eq!(store.publish(snapshot).version, 8);
    }

    #[test]
    fn test_reserved_versions_are_skipped() {
        let store = SnapshotStore::new();
        store.reserve_through(4);
        assert_eq!(store.version(), 0);
        assert_eq!(store.publish(trained_snapshot()).version, 5);
        store.reserve_through(2);
        assert_eq!(store.publish(trained_snapshot()).version, 6);
    }

    #[test]
    fn test_snapshot_best_model_and_vms() {
        let snapshot = trained_snapshot();
        assert!(snapshot.best_entry().is_some());
        assert_eq!(snapshot.known_vms().len(), 10);
        assert_eq!(snapshot.results().len(), snapshot.trained_count());
    }
}
