//! # QDrive Core
//!
//! Foundation types, error taxonomy, and hardware topology resolution for
//! automated qubit calibration.
//!
//! ## Gantree Architecture
//!
//! ```text
//! qdrive_core // L0+L1: Foundation + Topology (완료)
//!     L0_Foundation // 기반 타입/상수/에러 (완료)
//!         CoreTypes // ElementId, PortName, IqPoint, ExperimentTag (완료)
//!         Constants // 하드웨어 기본값/가드/분석 상수 (완료)
//!         Errors // 에러 타입 (완료)
//!         Persist // 원자적 파일 저장 (완료)
//!     L1_Topology // 하드웨어 토폴로지 (완료)
//!         HardwareTopology // 중첩 그래프 + DFS 경로 탐색 (완료)
//!         TopologyComposer // 포트 배선 → 그래프 (완료)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qdrive_core::prelude::*;
//!
//! let specs = vec![
//!     PortSpec::new("q0:mw", 2, 0),
//!     PortSpec::new("q0:res", 18, 0),
//! ];
//! let topo = TopologyComposer::compose(&specs, "DR4").unwrap();
//!
//! let path = topo.resolve("q0:mw", Some("q0.01")).unwrap();
//! assert_eq!(path.channel_address(), "cluster_dr4.module2.complex_output_0");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Core types (Gantree: L0_Foundation → CoreTypes)
pub mod types;

/// Constants (Gantree: L0_Foundation → Constants)
pub mod constants;

/// Error types (Gantree: L0_Foundation → Errors)
pub mod error;

/// Hardware topology (Gantree: L1_Topology → HardwareTopology)
pub mod topology;

/// Whole-object file persistence (Gantree: L0_Foundation → Persist)
pub mod persist;

// ============================================================================
// Re-exports
// ============================================================================

pub use constants::{analysis, hardware, lifecycle, schema};
pub use error::{QdriveError, QdriveResult};
pub use topology::{HardwareTopology, PathSegment, PhysicalPath, PortSpec, TopologyComposer};
pub use types::{
    AcquisitionMode, Decibel, ElementId, ExperimentTag, Hertz, IqPoint, IqReference, PortKind,
    PortName, Seconds, Volts,
};

// ============================================================================
// Prelude
// ============================================================================

pub mod prelude {
    //! Convenient imports for common use cases
    //!
    //! ```rust
    //! use qdrive_core::prelude::*;
    //! ```

    pub use crate::constants::{analysis, hardware, lifecycle, schema};
    pub use crate::error::{QdriveError, QdriveResult};
    pub use crate::topology::{
        HardwareTopology, PathSegment, PhysicalPath, PortSpec, TopologyComposer,
    };
    pub use crate::types::{
        AcquisitionMode, Decibel, ElementId, ExperimentTag, Hertz, IqPoint, IqReference,
        PortKind, PortName, Seconds, Volts,
    };
}

// ============================================================================
// Version Information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Integration Tests
// ============================================================================
