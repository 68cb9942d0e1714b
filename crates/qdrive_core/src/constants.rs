//! Constants for QDrive
//!
//! Gantree: L0_Foundation → Constants
//!
//! Hardware defaults applied at device registration, lifecycle guard
//! defaults, and analysis thresholds.

// ============================================================================
// Hardware Defaults
// Gantree: hardware // 하드웨어 기본값
// ============================================================================

pub mod hardware {
    //! Per-qubit defaults written into a freshly registered snapshot

    /// Default readout frequency (Hz)
    /// Gantree: READOUT_FREQ_HZ: f64 = 6e9
    pub const READOUT_FREQ_HZ: f64 = 6e9;

    /// Default drive frequency (Hz)
    /// Gantree: DRIVE_FREQ_HZ: f64 = 4e9
    pub const DRIVE_FREQ_HZ: f64 = 4e9;

    /// Default readout pulse amplitude
    pub const READOUT_PULSE_AMP: f64 = 0.5;

    /// Default acquisition delay (s)
    pub const ACQ_DELAY_S: f64 = 280e-9;

    /// Default integration time (s)
    pub const INTEGRATION_TIME_S: f64 = 1e-6;

    /// Default readout pulse duration (s), integration plus acquisition delay
    pub const READOUT_PULSE_DURATION_S: f64 = INTEGRATION_TIME_S + ACQ_DELAY_S;

    /// Default passive reset duration (s)
    /// Gantree: RESET_DURATION_S: f64 = 250e-6
    pub const RESET_DURATION_S: f64 = 250e-6;

    /// Default pi-pulse amplitude
    pub const PI_AMP: f64 = 0.05;

    /// Default pi-pulse duration (s)
    pub const PI_DURATION_S: f64 = 40e-9;

    /// Default drive intermediate frequency (Hz)
    pub const DRIVE_IF_HZ: f64 = 150e6;

    /// Local oscillator written for drive outputs at composition (Hz)
    pub const DRIVE_LO_HZ: f64 = 4e9;

    /// Local oscillator written for readout outputs at composition (Hz)
    pub const READOUT_LO_HZ: f64 = 6e9;

    /// Attenuation step enforced by the output stages (dB)
    pub const ATTENUATION_STEP_DB: f64 = 2.0;

    /// Maximum output attenuation (dB)
    pub const MAX_ATTENUATION_DB: f64 = 60.0;

    /// Flux outputs swing within ±this bias (V)
    pub const FLUX_OUTPUT_RANGE_V: f64 = 2.5;
}

// ============================================================================
// Lifecycle Guards
// Gantree: lifecycle // 라이프사이클 한도
// ============================================================================

pub mod lifecycle {
    //! Guard and iteration defaults for the experiment lifecycle

    /// Per-shot acquisition buffer ceiling (samples x averages)
    /// Gantree: ACQUISITION_BUFFER_CEILING: u64 = 131_000
    pub const ACQUISITION_BUFFER_CEILING: u64 = 131_000;

    /// Repeat count above which the workflow enters monitor mode
    /// Gantree: MONITOR_THRESHOLD: usize = 100
    pub const MONITOR_THRESHOLD: usize = 100;

    /// Maximum sweep span around a frequency center (Hz)
    pub const MAX_FREQUENCY_SPAN_HZ: f64 = 500e6;

    /// Time grids are snapped to this resolution (s)
    pub const TIME_RESOLUTION_S: f64 = 1e-9;

    /// Fitted decay constants longer than this multiple of the sweep window are rejected
    pub const DECAY_WINDOW_FACTOR: f64 = 5.0;
}

// ============================================================================
// Analysis
// Gantree: analysis // 분석 상수
// ============================================================================

pub mod analysis {
    //! Outlier filter and fit defaults

    /// Default IQR multiplier for outlier rejection
    pub const OUTLIER_THRESHOLD: f64 = 1.5;

    /// Default outlier window (points)
    pub const OUTLIER_WINDOW: usize = 7;

    /// Minimum points required for any fit
    pub const MIN_FIT_POINTS: usize = 4;
}

// ============================================================================
// Schema
// ============================================================================

pub mod schema {
    //! Calibration snapshot schema versions

    /// Current snapshot schema version
    pub const CURRENT_VERSION: u32 = 3;

    /// Oldest legacy schema eligible for migration
    pub const OLDEST_MIGRATABLE: u32 = 1;

    /// Suffix of the per-device snapshot file
    pub const SNAPSHOT_SUFFIX: &str = "_SumInfo";
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readout_duration_composition() {
        assert!(
            (hardware::READOUT_PULSE_DURATION_S - 1.28e-6).abs() < 1e-15,
            "got {}",
            hardware::READOUT_PULSE_DURATION_S
        );
    }

    #[test]
    fn test_lifecycle_defaults() {
        assert_eq!(lifecycle::ACQUISITION_BUFFER_CEILING, 131_000);
        assert_eq!(lifecycle::MONITOR_THRESHOLD, 100);
    }

    #[test]
    fn test_schema_versions() {
        assert!(schema::OLDEST_MIGRATABLE < schema::CURRENT_VERSION);
    }
}
