//! Error types for QDrive
//!
//! Gantree: L0_Foundation → Errors
//!
//! One error taxonomy shared by the calibration store, the lifecycle engine
//! and the analysis dispatch.

// Error variant fields are self-documenting via error messages
#![allow(missing_docs)]

use thiserror::Error;

/// Main error type for QDrive
/// Gantree: QdriveError // enum
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QdriveError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Invalid experiment parameter, raised before any hardware contact
    /// Gantree: ParameterValidation(String) // 파라미터 검증
    #[error("Parameter validation failed: {0}")]
    ParameterValidation(String),

    /// Acquisition buffer guard violated
    /// Gantree: ResourceLimitExceeded{{element,requested,ceiling}} // 버퍼 한도
    #[error(
        "Resource limit exceeded for {element}: {requested} samples x averages exceeds ceiling {ceiling}"
    )]
    ResourceLimitExceeded {
        element: String,
        requested: u64,
        ceiling: u64,
    },

    /// Element name could not be parsed
    #[error("Invalid element name '{0}': expected q<N> or c<N>")]
    InvalidElement(String),

    /// Element outside the registered qubit/coupler counts
    #[error("Element {element} is not registered on this device")]
    UnknownElement { element: String },

    // ========================================================================
    // Topology Errors
    // ========================================================================
    /// Logical port cannot be uniquely resolved
    /// Gantree: TopologyResolution(String) // 토폴로지 해석
    #[error("Topology resolution failed: {0}")]
    TopologyResolution(String),

    /// No physical path matches the port/clock predicate
    #[error("No physical path found for port '{port}'{}", clock_suffix(.clock))]
    NotFound { port: String, clock: Option<String> },

    // ========================================================================
    // Hardware Errors
    // ========================================================================
    /// Instrument link call failed
    /// Gantree: HardwareCommunication(String) // 하드웨어 통신
    #[error("Hardware communication error: {0}")]
    HardwareCommunication(String),

    /// Hardware handle already held by another lifecycle
    #[error("Hardware handle is busy: {0}")]
    HardwareBusy(String),

    // ========================================================================
    // Analysis Errors
    // ========================================================================
    /// Fit did not converge
    /// Gantree: FitConvergence{{model,reason}} // 피팅 실패
    #[error("Fit '{model}' failed to converge: {reason}")]
    FitConvergence { model: String, reason: String },

    /// Analysis tag without a registered routine
    #[error("Unknown analysis tag '{0}'")]
    UnknownAnalysisTag(String),

    /// Dataset content does not match what the routine expects
    #[error("Dataset error: {0}")]
    DatasetError(String),

    // ========================================================================
    // Snapshot Errors
    // ========================================================================
    /// Snapshot schema version not supported
    /// Gantree: VersionMismatch{{found,expected}} // 버전 불일치
    #[error("Snapshot version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: String, expected: u32 },

    /// Snapshot content cannot be deserialized
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Stage invoked out of order
    /// Gantree: InvalidState{{stage,state}} // 상태 위반
    #[error("Cannot run {stage} while lifecycle is {state}")]
    InvalidState { stage: String, state: String },

    /// Cooperative cancellation observed at a loop boundary
    #[error("Cancelled after {completed} completed passes")]
    Cancelled { completed: usize },

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(String),

    /// File I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn clock_suffix(clock: &Option<String>) -> String {
    clock
        .as_ref()
        .map(|c| format!(" with clock '{}'", c))
        .unwrap_or_default()
}

/// Result type alias for QDrive operations
/// Gantree: QdriveResult<T> // type alias
pub type QdriveResult<T> = Result<T, QdriveError>;

// ============================================================================
// Error Conversion Helpers
// ============================================================================

impl From<serde_json::Error> for QdriveError {
    fn from(err: serde_json::Error) -> Self {
        QdriveError::JsonError(err.to_string())
    }
}

impl From<std::io::Error> for QdriveError {
    fn from(err: std::io::Error) -> Self {
        QdriveError::FileError(err.to_string())
    }
}

// ============================================================================
// Error Helpers
// ============================================================================

impl QdriveError {
    /// Check if error is recoverable (handled locally, per variable)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, QdriveError::FitConvergence { .. })
    }

    /// Check if error must abort the current lifecycle
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Check if error was raised before hardware contact
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            QdriveError::ParameterValidation(_)
                | QdriveError::ResourceLimitExceeded { .. }
                | QdriveError::InvalidElement(_)
                | QdriveError::UnknownElement { .. }
        )
    }

    /// Check if error originates from the instrument link
    pub fn is_hardware_error(&self) -> bool {
        matches!(
            self,
            QdriveError::HardwareCommunication(_) | QdriveError::HardwareBusy(_)
        )
    }

    /// Check if error comes from loading a snapshot
    pub fn is_snapshot_error(&self) -> bool {
        matches!(
            self,
            QdriveError::VersionMismatch { .. } | QdriveError::CorruptSnapshot(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
