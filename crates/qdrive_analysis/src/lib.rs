//! # QDrive Analysis
//!
//! Raw sweep data → fit packs. IQ reduction, outlier rejection, the fit
//! engine boundary and the tag-keyed `{analyze, render}` registry with
//! per-element fault isolation.
//!
//! ## Gantree Architecture
//!
//! ```text
//! qdrive_analysis // L4: Analysis Dispatch (완료)
//!     Reduce // 두 점 거리 / 회전 축소 (완료)
//!     OutlierFilter // median/IQR 창 필터 (완료)
//!     FitEngine // 외부 피팅 trait (완료)
//!     FitPack // 결과 묶음 (완료)
//!     Routines // 실험별 분석 16종 (완료)
//!     Render // 그림 산출물 + 원시 경로 (완료)
//!     AnalysisRegistry // 태그 → {analyze, render}, 생성 시 검증 (완료)
//!     AnalysisDispatch // 원소별 고장 격리 (완료)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qdrive_analysis::prelude::*;
//! use qdrive_core::ExperimentTag;
//!
//! let registry = AnalysisRegistry::standard();
//! assert!(registry.get(ExperimentTag::Ramsey).is_ok());
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// IQ-plane reduction (Gantree: L4_Analysis → Reduce)
pub mod reduce;

/// Outlier rejection (Gantree: L4_Analysis → OutlierFilter)
pub mod outlier;

/// Fit engine boundary (Gantree: L4_Analysis → FitEngine)
pub mod fit;

/// Fit pack (Gantree: L4_Analysis → FitPack)
pub mod fit_pack;

/// Render artifacts (Gantree: L4_Analysis → Render)
pub mod render;

/// Per-experiment routines (Gantree: L4_Analysis → Routines)
pub mod routines;

/// Tag-keyed routine table (Gantree: L4_Analysis → AnalysisRegistry)
pub mod registry;

/// Dataset analysis runner (Gantree: L4_Analysis → AnalysisDispatch)
pub mod dispatch;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatch::{AnalysisDispatch, DatasetAnalysis, ElementOutcome};
pub use fit::{FitEngine, FitInput, FitModel, FitRecord};
pub use fit_pack::{FitPack, FitValue};
pub use outlier::OutlierFilter;
pub use reduce::{mean_point, reduce_iq, rotate, rotation_onto_inphase};
pub use registry::{AnalysisRegistry, AnalysisRoutine};
pub use render::{render_raw, RenderFn, RenderInput, RenderKind, Rendering};
pub use routines::{AnalysisContext, AnalyzeFn};

// ============================================================================
// Prelude
// ============================================================================

/// Convenient imports for common use cases
pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! ```rust
    //! use qdrive_analysis::prelude::*;
    //! ```

    pub use crate::dispatch::{AnalysisDispatch, DatasetAnalysis, ElementOutcome};
    pub use crate::fit::{FitEngine, FitInput, FitModel, FitRecord};
    pub use crate::fit_pack::FitPack;
    pub use crate::outlier::OutlierFilter;
    pub use crate::registry::{AnalysisRegistry, AnalysisRoutine};
    pub use crate::render::{RenderKind, Rendering};
}

// ============================================================================
// Integration Tests
// ============================================================================
