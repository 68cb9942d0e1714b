//! Snapshot persistence
//!
//! Gantree: L2_Calibration → SnapshotStore
//!
//! One JSON document per device. Saves are whole-object atomic replacements;
//! loads migrate recognized legacy schemas once and tag the result current.
//! Concurrent writers from independent processes are not detected: the last
//! writer wins.

use crate::migration::VersionedSnapshot;
use crate::snapshot::CalibrationSnapshot;
use chrono::{DateTime, Local};
use qdrive_core::constants::schema;
use qdrive_core::persist;
use qdrive_core::{QdriveError, QdriveResult};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Snapshot load/save operations
/// Gantree: SnapshotStore // 스냅샷 저장소
pub struct SnapshotStore;

impl SnapshotStore {
    /// Load a snapshot, migrating legacy schemas
    /// Gantree: load(path) -> Snapshot // 로드
    pub fn load(path: &Path) -> QdriveResult<CalibrationSnapshot> {
        let bytes = fs::read(path)
            .map_err(|e| QdriveError::FileError(format!("read {}: {}", path.display(), e)))?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            QdriveError::CorruptSnapshot(format!("{}: {}", path.display(), e))
        })?;

        let versioned = VersionedSnapshot::from_value(value)?;
        let found = versioned.version();
        let snapshot = versioned.into_current()?;
        if found != schema::CURRENT_VERSION {
            log::info!(
                "Migrated {} from schema v{} to v{}",
                path.display(),
                found,
                schema::CURRENT_VERSION
            );
        }
        log::debug!("Loaded {}", snapshot);
        Ok(snapshot)
    }

    /// Save a snapshot, atomically replacing `path`
    /// Gantree: save(snapshot,path) -> Result // 저장
    pub fn save(snapshot: &CalibrationSnapshot, path: &Path) -> QdriveResult<()> {
        if snapshot.version() != schema::CURRENT_VERSION {
            return Err(QdriveError::VersionMismatch {
                found: snapshot.version().to_string(),
                expected: schema::CURRENT_VERSION,
            });
        }
        persist::write_json(path, snapshot)?;
        log::info!("Saved {} to {}", snapshot.device.identity, path.display());
        Ok(())
    }

    /// Dated backup location, `root/YYYYMMDD/{identity}_SumInfo.json`
    pub fn dated_path(root: &Path, snapshot: &CalibrationSnapshot, at: DateTime<Local>) -> PathBuf {
        root.join(at.format("%Y%m%d").to_string())
            .join(snapshot.file_name())
    }

    /// Save into today's backup folder under `root`
    pub fn save_dated(snapshot: &CalibrationSnapshot, root: &Path) -> QdriveResult<PathBuf> {
        let path = Self::dated_path(root, snapshot, Local::now());
        Self::save(snapshot, &path)?;
        Ok(path)
    }
}

// ============================================================================
// Tests
// ============================================================================
