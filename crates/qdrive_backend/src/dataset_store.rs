//! Raw dataset persistence
//!
//! Gantree: L3_Backend → DatasetStore
//!
//! Datasets land in `root/YYYYMMDD/<batch>/<tag>_<job or timestamp>.json`.
//! Existing files are never overwritten; a numeric suffix is appended instead.

use crate::dataset::Dataset;
use chrono::{DateTime, Local};
use qdrive_core::persist;
use qdrive_core::{ExperimentTag, QdriveError, QdriveResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Dataset folder layout and save/load
/// Gantree: DatasetStore // 데이터셋 저장소
#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: PathBuf,
}

impl DatasetStore {
    /// Store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root folder
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Batch folder: `root/YYYYMMDD/{special or H{hh}M{mm}S{ss}}`
    /// Gantree: batch_folder(special,at) -> PathBuf // 배치 폴더
    pub fn batch_folder(&self, special_name: Option<&str>, at: DateTime<Local>) -> PathBuf {
        let day = self.root.join(at.format("%Y%m%d").to_string());
        match special_name.filter(|s| !s.trim().is_empty()) {
            Some(name) => day.join(name),
            None => day.join(at.format("H%HM%MS%S").to_string()),
        }
    }

    /// Create the batch folder for now
    pub fn create_batch(&self, special_name: Option<&str>) -> QdriveResult<PathBuf> {
        let folder = self.batch_folder(special_name, Local::now());
        fs::create_dir_all(&folder)
            .map_err(|e| QdriveError::FileError(format!("mkdir {}: {}", folder.display(), e)))?;
        Ok(folder)
    }

    /// Dataset base name, `{tag}_{job}` or `{tag}_{YYYYmmddHHMMSS}`
    pub fn dataset_name(tag: ExperimentTag, job_id: Option<&str>, at: DateTime<Local>) -> String {
        match job_id.filter(|j| !j.trim().is_empty()) {
            Some(job) => format!("{}_{}", tag, job),
            None => format!("{}_{}", tag, at.format("%Y%m%d%H%M%S")),
        }
    }

    /// Save a dataset into `folder` without overwriting
    /// Gantree: save(dataset,folder,job) -> PathBuf // 저장
    pub fn save(
        &self,
        dataset: &Dataset,
        folder: &Path,
        job_id: Option<&str>,
    ) -> QdriveResult<PathBuf> {
        let base = Self::dataset_name(dataset.metadata.tag, job_id, Local::now());
        let path = Self::free_path(folder, &base);
        persist::write_json(&path, dataset)?;
        log::info!("Dataset saved: {}", path.display());
        Ok(path)
    }

    /// Load a saved dataset
    pub fn load(path: &Path) -> QdriveResult<Dataset> {
        persist::read_json(path).map_err(|e| match e {
            QdriveError::JsonError(msg) => {
                QdriveError::DatasetError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    fn free_path(folder: &Path, base: &str) -> PathBuf {
        let mut path = folder.join(format!("{}.json", base));
        let mut n = 1;
        while path.exists() {
            path = folder.join(format!("{}_{}.json", base, n));
            n += 1;
        }
        path
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DataVariable, DatasetMetadata};
    use chrono::TimeZone;
    use qdrive_core::{AcquisitionMode, ElementId};

    fn dataset() -> Dataset {
        let mut ds = Dataset::new(DatasetMetadata::new(
            ExperimentTag::EnergyRelaxation,
            AcquisitionMode::Averaged,
            300,
        ));
        let var = DataVariable::averaged("q0_x", &[(vec![1.0, 0.5], vec![0.0, 0.1])]).unwrap();
        ds.insert_element(ElementId::Qubit(0), var, vec![0.0, 20e-6])
            .unwrap();
        ds
    }

    #[test]
    fn test_batch_folder_names() {
        let store = DatasetStore::new("/data");
        let at = Local.with_ymd_and_hms(2024, 11, 2, 9, 5, 7).unwrap();
        assert_eq!(
            store.batch_folder(None, at),
            PathBuf::from("/data/20241102/H09M05S07")
        );
        assert_eq!(
            store.batch_folder(Some("T1_scan"), at),
            PathBuf::from("/data/20241102/T1_scan")
        );
    }

    #[test]
    fn test_dataset_name() {
        let at = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            DatasetStore::dataset_name(ExperimentTag::EnergyRelaxation, None, at),
            "T1_20240102030405"
        );
        assert_eq!(
            DatasetStore::dataset_name(ExperimentTag::Ramsey, Some("job7"), at),
            "Ramsey_job7"
        );
    }

    #[test]
    fn test_save_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path());
        let folder = dir.path().join("batch");

        let first = store.save(&dataset(), &folder, Some("j")).unwrap();
        let second = store.save(&dataset(), &folder, Some("j")).unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("T1_j_1.json"));

        let loaded = DatasetStore::load(&second).unwrap();
        assert_eq!(loaded, dataset_with_time(&loaded));
    }

    fn dataset_with_time(loaded: &Dataset) -> Dataset {
        let mut ds = dataset();
        ds.metadata.capture_time = loaded.metadata.capture_time;
        ds
    }

    #[test]
    fn test_nan_sample_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path());
        let mut ds = Dataset::new(DatasetMetadata::new(
            ExperimentTag::EnergyRelaxation,
            AcquisitionMode::Averaged,
            300,
        ));
        let var = DataVariable::averaged("q0_x", &[(vec![1.0, f64::NAN], vec![0.0, 0.1])]).unwrap();
        ds.insert_element(ElementId::Qubit(0), var, vec![0.0, 20e-6])
            .unwrap();

        let path = store.save(&ds, dir.path(), Some("nan")).unwrap();
        let loaded = DatasetStore::load(&path).unwrap();
        let (i, q) = loaded.variable(ElementId::Qubit(0)).unwrap().trace(0).unwrap();
        assert_eq!(i[0], 1.0);
        assert!(i[1].is_nan());
        assert_eq!(q, vec![0.0, 0.1]);
    }

    #[test]
    fn test_load_rejects_short_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("T1_bad.json");
        let mut doc = serde_json::to_value(dataset()).unwrap();
        doc["variables"]["q0"]["shape"] = serde_json::json!([2, 1, 3]);
        doc["variables"]["q0"]["values"] = serde_json::json!([1.0, 2.0]);
        doc["coords"]["q0_x"] = serde_json::json!([0.0, 1.0, 2.0]);
        fs::write(&path, doc.to_string()).unwrap();

        assert!(matches!(
            DatasetStore::load(&path),
            Err(QdriveError::DatasetError(_))
        ));
    }

    #[test]
    fn test_load_rejects_axis_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("T1_axis.json");
        let mut doc = serde_json::to_value(dataset()).unwrap();
        doc["coords"]["q0_x"] = serde_json::json!([0.0, 1.0, 2.0]);
        fs::write(&path, doc.to_string()).unwrap();

        let err = DatasetStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("axis has 3"));
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        fs::write(&path, "{\"variables\": 3}").unwrap();
        assert!(matches!(
            DatasetStore::load(&path),
            Err(QdriveError::DatasetError(_))
        ));
    }
}
