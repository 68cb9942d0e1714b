//! # QDrive Engine
//!
//! Experiment lifecycle runner and experiment catalog.
//!
//! ## Gantree Architecture
//!
//! ```text
//! qdrive_engine // L5: Engine (완료)
//!     LifecycleConfig // 통합 설정 (완료)
//!         guards, storage, commit policy, analysis
//!     SamplingFunction // 스윕 격자 (완료)
//!     Experiment // 실험 trait (완료)
//!         derive_parameters() → prepare() → measure() → close()
//!         propose_update()
//!     CalibrationUpdate // 승인 후 적용 (완료)
//!     ConfirmationPort // 승인 포트 (완료)
//!     ExperimentRunner // 라이프사이클 실행기 (완료)
//!         set_parameters() → prepare_hardware() → run_measurement()
//!         → close_measurement() → run_analysis()
//!         work_flow() - 반복 / 모니터 모드
//!     Catalog // 실험 16종 (완료)
//!     QubitMonitor // T1 → T2 → 단발 반복 (완료)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qdrive_engine::prelude::*;
//! use qdrive_core::ElementId;
//!
//! let ranges = ElementRanges::from([(ElementId::Qubit(0), (0.0, 0.3))]);
//! let rabi = PowerRabi::new(ranges, SamplingFunction::Linear { points: 61 });
//! let config = LifecycleConfig::new("DR4#81_SumInfo.json", "data");
//! let link = SharedLink::new(SimulatedLink::new(), "192.168.1.81");
//!
//! let runner = ExperimentRunner::new(rabi, config, link);
//! assert_eq!(runner.state(), LifecycleState::Idle);
//! ```
//!
//! ## Running a Lifecycle
//!
//! ```rust,no_run
//! use qdrive_engine::prelude::*;
//! # fn run(runner: &mut ExperimentRunner<PowerRabi>, dispatch: &AnalysisDispatch)
//! #     -> qdrive_core::QdriveResult<()> {
//! runner.set_parameters(true)?;
//! runner.work_flow(1, &CancellationToken::new())?;
//! let report = runner.run_analysis(dispatch, &AutoApprove)?;
//! println!("{} update(s) committed", report.applied.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Configuration (Gantree: L5_Engine → LifecycleConfig)
pub mod config;

/// Sweep grids (Gantree: L5_Engine → SamplingFunction)
pub mod sampling;

/// Experiment capability set (Gantree: L5_Engine → Experiment)
pub mod experiment;

/// Calibration updates (Gantree: L5_Engine → CalibrationUpdate)
pub mod update;

/// Confirmation port (Gantree: L5_Engine → ConfirmationPort)
pub mod confirm;

/// Lifecycle runner (Gantree: L5_Engine → ExperimentRunner)
pub mod lifecycle;

/// Concrete experiments (Gantree: L5_Engine → Catalog)
pub mod catalog;

/// Coherence monitor (Gantree: L5_Engine → QubitMonitor)
pub mod monitor;

// ============================================================================
// Re-exports
// ============================================================================

pub use catalog::{
    decay_accepted, CavitySearch, CoherenceRequest, Cpmg, DragCalibration, DriveFreqCalibration,
    ElementRanges, EnergyRelaxation, FluxCavity, FluxQubit, IqReferenceExp, PiAmpCalibration,
    PowerRabi, Ramsey, ReadoutFreqCalibration, SingleShot, SpinEcho, TimeRabi,
    TwoToneSpectroscopy,
};
pub use config::LifecycleConfig;
pub use confirm::{Approval, ApproveElements, AutoApprove, ConfirmationPort, DenyAll};
pub use experiment::{
    element_sweep, push_settings, resolve_bindings, CommitPolicy, Experiment, SweepPlan,
};
pub use lifecycle::{
    check_buffer, check_plan, AnalysisReport, CancellationToken, ExperimentRunner,
    LifecycleState, WorkFlowReport,
};
pub use monitor::{MonitorReport, MonitorSettings, QubitMonitor};
pub use sampling::{snap_time, SamplingFunction};
pub use update::{CalibrationUpdate, ParameterChange};

// ============================================================================
// Prelude
// ============================================================================

/// Convenient imports for common use cases
pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! ```rust
    //! use qdrive_engine::prelude::*;
    //! ```

    pub use crate::catalog::*;
    pub use crate::config::LifecycleConfig;
    pub use crate::confirm::{Approval, ApproveElements, AutoApprove, ConfirmationPort, DenyAll};
    pub use crate::experiment::{CommitPolicy, Experiment, SweepPlan};
    pub use crate::lifecycle::{
        AnalysisReport, CancellationToken, ExperimentRunner, LifecycleState, WorkFlowReport,
    };
    pub use crate::monitor::{MonitorReport, MonitorSettings, QubitMonitor};
    pub use crate::sampling::SamplingFunction;
    pub use crate::update::{CalibrationUpdate, ParameterChange};

    pub use qdrive_analysis::{AnalysisDispatch, AnalysisRegistry};
    pub use qdrive_backend::{SharedLink, SimulatedLink};
}

// ============================================================================
// Integration Tests
// ============================================================================
