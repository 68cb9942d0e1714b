//! # QDrive Backend
//!
//! Instrument link abstraction, exclusive hardware handle, simulated cluster
//! and raw dataset persistence.
//!
//! ## Gantree Architecture
//!
//! ```text
//! qdrive_backend // L3: Backend (완료)
//!     InstrumentLink // 계측기 trait (완료)
//!         connect, set_attenuation, set_bias, set_lo_frequency
//!         run_sweep, reset_and_zero
//!     SharedLink // Mutex 보호 핸들 (완료)
//!         acquire() -> LinkSession // try_lock, HardwareBusy
//!     SimulatedLink // 시뮬레이션 (완료)
//!     Dataset // 라벨 데이터셋 (완료)
//!     DatasetStore // YYYYMMDD/batch 저장 (완료)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qdrive_backend::prelude::*;
//!
//! let shared = SharedLink::new(SimulatedLink::new(), "192.168.1.81");
//! let mut session = shared.acquire().unwrap();
//! session.reset_and_zero().unwrap();
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Labeled dataset (Gantree: L3_Backend → Dataset)
pub mod dataset;

/// Instrument link trait and exclusive handle (Gantree: L3_Backend → InstrumentLink)
pub mod link;

/// Simulated cluster (Gantree: L3_Backend → SimulatedLink)
pub mod simulated;

/// Dataset persistence (Gantree: L3_Backend → DatasetStore)
pub mod dataset_store;

// ============================================================================
// Re-exports
// ============================================================================

pub use dataset::{DataVariable, Dataset, DatasetMetadata};
pub use dataset_store::DatasetStore;
pub use link::{
    ChannelBinding, ElementSweep, HandleId, InstrumentLink, LinkSession, SharedLink, SweepSpec,
};
pub use simulated::{CallLog, LinkCall, LinkOp, ResponseFn, SimulatedLink};

// ============================================================================
// Prelude
// ============================================================================

/// Convenient imports for common use cases
pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! ```rust
    //! use qdrive_backend::prelude::*;
    //! ```

    pub use crate::dataset::{DataVariable, Dataset, DatasetMetadata};
    pub use crate::dataset_store::DatasetStore;
    pub use crate::link::{
        ChannelBinding, ElementSweep, InstrumentLink, LinkSession, SharedLink, SweepSpec,
    };
    pub use crate::simulated::{LinkCall, LinkOp, SimulatedLink};
}

// ============================================================================
// Integration Tests
// ============================================================================
