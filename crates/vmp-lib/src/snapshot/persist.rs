//! On-disk snapshot history
//!
//! Each published snapshot is written as `snapshot_v{N}.json` next to a
//! `manifest.json` listing the kept versions, newest first, with their
//! SHA-256 checksums. Files are written to a temp path and renamed so a
//! crash never leaves a truncated snapshot behind.

use super::ModelSnapshot;
use crate::error::{PlacementError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_VERSIONS_TO_KEEP: usize = 5;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub version: u64,
    pub file: String,
    pub sha256: String,
    pub size_bytes: usize,
    pub best_model: Option<String>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// Newest first
    pub versions: Vec<ManifestEntry>,
}

/// Writes and reads snapshots under a model directory
#[derive(Debug, Clone)]
pub struct SnapshotPersister {
    dir: PathBuf,
    versions_to_keep: usize,
}

impl SnapshotPersister {
    pub fn new(dir: impl Into<PathBuf>, versions_to_keep: usize) -> Result<Self> {
        if versions_to_keep == 0 {
            return Err(PlacementError::Config("versions_to_keep must be at least 1".into()));
        }
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            versions_to_keep,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> Result<SnapshotManifest> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(SnapshotManifest::default());
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Highest version recorded in the manifest, 0 when empty
    pub fn latest_version(&self) -> Result<u64> {
        Ok(self.manifest()?.versions.iter().map(|v| v.version).max().unwrap_or(0))
    }

    /// Write `snapshot` and record it in the manifest, pruning old versions
    pub fn save(&self, snapshot: &ModelSnapshot) -> Result<ManifestEntry> {
        let bytes = serde_json::to_vec(snapshot)?;
        let file = format!("snapshot_v{}.json", snapshot.version);
        write_atomic(&self.dir.join(&file), &bytes)?;

        let entry = ManifestEntry {
            version: snapshot.version,
            file,
            sha256: compute_checksum(&bytes),
            size_bytes: bytes.len(),
            best_model: snapshot.best_model.clone(),
            saved_at: Utc::now(),
        };

        let mut manifest = self.manifest()?;
        manifest.versions.retain(|v| v.version != entry.version);
        manifest.versions.insert(0, entry.clone());
        while manifest.versions.len() > self.versions_to_keep {
            if let Some(removed) = manifest.versions.pop() {
                let path = self.dir.join(&removed.file);
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove old snapshot");
                } else {
                    debug!(version = removed.version, "Old snapshot removed");
                }
            }
        }
        write_atomic(&self.dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

        info!(
            version = entry.version,
            size = entry.size_bytes,
            checksum = %entry.sha256,
            "Snapshot persisted"
        );
        Ok(entry)
    }

    /// Read one recorded version, verifying its checksum
    pub fn load(&self, entry: &ManifestEntry) -> Result<ModelSnapshot> {
        let bytes = fs::read(self.dir.join(&entry.file))?;
        let actual = compute_checksum(&bytes);
        if actual != entry.sha256 {
            return Err(PlacementError::ChecksumMismatch {
                expected: entry.sha256.clone(),
                actual,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Newest snapshot that loads and verifies, falling back to older versions
    pub fn load_latest(&self) -> Result<Option<ModelSnapshot>> {
        let manifest = self.manifest()?;
        for entry in &manifest.versions {
            match self.load(entry) {
                Ok(snapshot) => {
                    info!(version = entry.version, "Snapshot loaded from disk");
                    return Ok(Some(snapshot));
                }
                Err(e) => {
                    warn!(
                        version = entry.version,
                        error = %e,
                        "Snapshot unusable, trying previous version"
                    );
                }
            }
        }
        Ok(None)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::test_support::trained_snapshot;
    use tempfile::TempDir;

    fn versioned(version: u64) -> ModelSnapshot {
        let mut snapshot = trained_snapshot();
        snapshot.version = version;
        snapshot
    }

    #[test]
    fn test_save_and_load_latest() {
        let dir = TempDir::new().unwrap();
        let persister = SnapshotPersister::new(dir.path(), 5).unwrap();
        let snapshot = versioned(1);
        persister.save(&snapshot).unwrap();

        assert!(dir.path().join("snapshot_v1.json").exists());
        let loaded = persister.load_latest().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_old_versions_pruned() {
        let dir = TempDir::new().unwrap();
        let persister = SnapshotPersister::new(dir.path(), 2).unwrap();
        let snapshot = trained_snapshot();
        for v in 1..=4 {
            let mut s = snapshot.clone();
            s.version = v;
            persister.save(&s).unwrap();
        }
        let manifest = persister.manifest().unwrap();
        let versions: Vec<u64> = manifest.versions.iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![4, 3]);
        assert!(!dir.path().join("snapshot_v1.json").exists());
        assert!(!dir.path().join("snapshot_v2.json").exists());
    }

    #[test]
    fn test_corrupt_snapshot_falls_back() {
        let dir = TempDir::new().unwrap();
        let persister = SnapshotPersister::new(dir.path(), 5).unwrap();
        persister.save(&versioned(1)).unwrap();
        persister.save(&versioned(2)).unwrap();
        fs::write(dir.path().join("snapshot_v2.json"), b"{}").unwrap();

        let manifest = persister.manifest().unwrap();
        assert!(matches!(
            persister.load(&manifest.versions[0]),
            Err(PlacementError::ChecksumMismatch { .. })
        ));
        let loaded = persister.load_latest().unwrap().unwrap();
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_empty_dir_has_no_snapshot() {
        let dir = TempDir::new().unwrap();
        let persister = SnapshotPersister::new(dir.path().join("models"), 5).unwrap();
        assert!(persister.load_latest().unwrap().is_none());
        assert_eq!(persister.latest_version().unwrap(), 0);
    }

    #[test]
    fn test_latest_version() {
        let dir = TempDir::new().unwrap();
        let persister = SnapshotPersister::new(dir.path(), 5).unwrap();
        persister.save(&versioned(3)).unwrap();
        persister.save(&versioned(7)).unwrap();
        assert_eq!(persister.latest_version().unwrap(), 7);
    }

    #[test]
    fn test_zero_versions_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(SnapshotPersister::new(dir.path(), 0).is_err());
    }
}
