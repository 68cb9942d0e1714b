//! Lifecycle configuration
//!
//! Gantree: L5_Engine → LifecycleConfig
//!
//! One explicit configuration value per experiment process, built once and
//! passed by reference to every lifecycle stage.

use qdrive_analysis::OutlierFilter;
use qdrive_backend::DatasetStore;
use qdrive_core::constants::{analysis, lifecycle};
use qdrive_core::persist;
use qdrive_core::{QdriveError, QdriveResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Lifecycle configuration
/// Gantree: LifecycleConfig // 통합 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    // ========================================================================
    // Resource Guards
    // ========================================================================
    /// Per-shot acquisition buffer ceiling (samples x averages)
    pub buffer_ceiling: u64,

    /// Repeat count above which the workflow runs in monitor mode
    pub monitor_threshold: usize,

    /// Maximum sweep span per element (Hz)
    pub max_frequency_span_hz: f64,

    /// Hard cap on monitor-mode passes
    pub monitor_iteration_cap: Option<usize>,

    // ========================================================================
    // Storage
    // ========================================================================
    /// Root folder of raw datasets
    pub data_root: PathBuf,

    /// Calibration snapshot file
    pub snapshot_path: PathBuf,

    /// Caller-supplied dataset id (timestamp when absent)
    pub job_id: Option<String>,

    /// Batch folder name (time of day when absent)
    pub batch_name: Option<String>,

    /// Persist the snapshot after approved updates
    pub keep_snapshot: bool,

    /// Write rendering artifacts next to the datasets
    pub save_artifacts: bool,

    // ========================================================================
    // Commit Policy
    // ========================================================================
    /// Ask the confirmation port for every commit, quality-gated ones included
    pub require_confirmation: bool,

    // ========================================================================
    // Analysis
    // ========================================================================
    /// Outlier filter window (points); below 3 keeps every sample
    pub outlier_window: usize,

    /// Outlier filter IQR multiplier
    pub outlier_threshold: f64,
}

impl LifecycleConfig {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Configuration for a snapshot file and data folder
    pub fn new(snapshot_path: impl Into<PathBuf>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            buffer_ceiling: lifecycle::ACQUISITION_BUFFER_CEILING,
            monitor_threshold: lifecycle::MONITOR_THRESHOLD,
            max_frequency_span_hz: lifecycle::MAX_FREQUENCY_SPAN_HZ,
            monitor_iteration_cap: None,
            data_root: data_root.into(),
            snapshot_path: snapshot_path.into(),
            job_id: None,
            batch_name: None,
            keep_snapshot: true,
            save_artifacts: true,
            require_confirmation: false,
            outlier_window: analysis::OUTLIER_WINDOW,
            outlier_threshold: analysis::OUTLIER_THRESHOLD,
        }
    }

    /// Load from a JSON file
    /// Gantree: from_file(path) -> Result<Config> // 파일 로드
    pub fn from_file(path: &Path) -> QdriveResult<Self> {
        let config: Self = persist::read_json(path)?;
        config.validate().map_err(QdriveError::ConfigError)?;
        Ok(config)
    }

    // ========================================================================
    // Builder Methods
    // ========================================================================

    /// Set the acquisition buffer ceiling
    pub fn with_buffer_ceiling(mut self, ceiling: u64) -> Self {
        self.buffer_ceiling = ceiling;
        self
    }

    /// Set the monitor-mode threshold
    pub fn with_monitor_threshold(mut self, threshold: usize) -> Self {
        self.monitor_threshold = threshold;
        self
    }

    /// Cap monitor-mode passes
    pub fn with_monitor_cap(mut self, cap: usize) -> Self {
        self.monitor_iteration_cap = Some(cap);
        self
    }

    /// Set the maximum frequency span
    pub fn with_max_frequency_span(mut self, span_hz: f64) -> Self {
        self.max_frequency_span_hz = span_hz;
        self
    }

    /// Set the job id
    pub fn with_job_id(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    /// Set the batch folder name
    pub fn with_batch_name(mut self, name: &str) -> Self {
        self.batch_name = Some(name.to_string());
        self
    }

    /// Persist approved updates or not
    pub fn with_keep_snapshot(mut self, keep: bool) -> Self {
        self.keep_snapshot = keep;
        self
    }

    /// Write rendering artifacts or not
    pub fn with_save_artifacts(mut self, save: bool) -> Self {
        self.save_artifacts = save;
        self
    }

    /// Require confirmation for every commit
    pub fn with_require_confirmation(mut self, required: bool) -> Self {
        self.require_confirmation = required;
        self
    }

    /// Set the outlier filter
    pub fn with_outlier_filter(mut self, window: usize, threshold: f64) -> Self {
        self.outlier_window = window;
        self.outlier_threshold = threshold;
        self
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Outlier filter for analysis
    pub fn outlier_filter(&self) -> OutlierFilter {
        OutlierFilter::new(self.outlier_window, self.outlier_threshold)
    }

    /// Dataset store rooted at the data folder
    pub fn dataset_store(&self) -> DatasetStore {
        DatasetStore::new(self.data_root.clone())
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_ceiling == 0 {
            return Err("buffer_ceiling must be > 0".to_string());
        }

        if self.monitor_threshold == 0 {
            return Err("monitor_threshold must be > 0".to_string());
        }

        if !(self.max_frequency_span_hz.is_finite() && self.max_frequency_span_hz > 0.0) {
            return Err(format!(
                "max_frequency_span_hz must be positive, got {}",
                self.max_frequency_span_hz
            ));
        }

        if self.monitor_iteration_cap == Some(0) {
            return Err("monitor_iteration_cap must be > 0 when set".to_string());
        }

        if self.snapshot_path.as_os_str().is_empty() {
            return Err("snapshot_path is empty".to_string());
        }

        if self.data_root.as_os_str().is_empty() {
            return Err("data_root is empty".to_string());
        }

        if !(self.outlier_threshold.is_finite() && self.outlier_threshold > 0.0) {
            return Err(format!(
                "outlier_threshold must be positive, got {}",
                self.outlier_threshold
            ));
        }

        Ok(())
    }
}

impl fmt::Display for LifecycleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LifecycleConfig(snapshot={}, data={}, ceiling={}, monitor>{})",
            self.snapshot_path.display(),
            self.data_root.display(),
            self.buffer_ceiling,
            self.monitor_threshold
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LifecycleConfig::new("DR4#81_SumInfo.json", "data");
        assert_eq!(config.buffer_ceiling, 131_000);
        assert_eq!(config.monitor_threshold, 100);
        assert_eq!(config.max_frequency_span_hz, 500e6);
        assert!(config.keep_snapshot);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = LifecycleConfig::new("s.json", "data")
            .with_buffer_ceiling(65_536)
            .with_monitor_cap(3)
            .with_job_id("J42")
            .with_keep_snapshot(false);

        assert_eq!(config.buffer_ceiling, 65_536);
        assert_eq!(config.monitor_iteration_cap, Some(3));
        assert_eq!(config.job_id.as_deref(), Some("J42"));
        assert!(!config.keep_snapshot);
    }

    #[test]
    fn test_validation() {
        assert!(LifecycleConfig::new("", "data").validate().is_err());
        assert!(LifecycleConfig::new("s.json", "data")
            .with_buffer_ceiling(0)
            .validate()
            .is_err());
        assert!(LifecycleConfig::new("s.json", "data")
            .with_monitor_cap(0)
            .validate()
            .is_err());
        assert!(LifecycleConfig::new("s.json", "data")
            .with_outlier_filter(7, -1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lifecycle.json");
        let config = LifecycleConfig::new("s.json", "data").with_monitor_threshold(50);
        persist::write_json(&path, &config).unwrap();

        let loaded = LifecycleConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let bad = config.with_buffer_ceiling(0);
        persist::write_json(&path, &bad).unwrap();
        assert!(matches!(
            LifecycleConfig::from_file(&path),
            Err(QdriveError::ConfigError(_))
        ));
    }
}
