//! # QDrive Calibration
//!
//! Versioned per-device calibration state: notebook, flux biases, waveform
//! metadata, IQ references and discrimination models, with persistence and
//! one-directional schema migration.
//!
//! ## Gantree Architecture
//!
//! ```text
//! qdrive_calibration // L2: Calibration Store (완료)
//!     CalibrationSnapshot // 버전 스냅샷 (완료)
//!         device, topology, notebook, flux, waveforms
//!         ref_iq, rotation_angle, discriminators
//!         reference_for(), memo_ref_iq(), refresh_log()
//!     register_device() // 장치 등록 + 토폴로지 검증 (완료)
//!     Migration // V1 → V2 → V3 (완료)
//!     SnapshotStore // 원자적 저장/로드 (완료)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qdrive_calibration::prelude::*;
//! use qdrive_core::{ElementId, PortSpec};
//!
//! let specs = vec![
//!     PortSpec::new("q0:mw", 2, 0),
//!     PortSpec::new("q0:res", 18, 0),
//! ];
//! let chip = ChipMeta::new("demo", "1Q", 1, 0);
//! let snapshot = register_device(&specs, "192.168.1.81", "DR4", chip).unwrap();
//!
//! let note = snapshot.notebook.note(ElementId::Qubit(0)).unwrap();
//! assert_eq!(note.readout_freq, 6e9);
//! assert_eq!(snapshot.file_name(), "DR4#81_SumInfo.json");
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Per-qubit notebook (Gantree: L2_Calibration → Notebook)
pub mod notebook;

/// Flux bias table (Gantree: L2_Calibration → FluxBiasTable)
pub mod flux;

/// Waveform metadata (Gantree: L2_Calibration → WaveformLibrary)
pub mod waveform;

/// Readout discrimination models (Gantree: L2_Calibration → Discriminator)
pub mod discriminator;

/// Calibration snapshot (Gantree: L2_Calibration → CalibrationSnapshot)
pub mod snapshot;

/// Schema migration (Gantree: L2_Calibration → Migration)
pub mod migration;

/// Snapshot persistence (Gantree: L2_Calibration → SnapshotStore)
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use discriminator::{DiscriminatorBank, DiscriminatorModel};
pub use flux::{FluxBias, FluxBiasTable};
pub use migration::{migrate_v1_to_v2, migrate_v2_to_v3, SnapshotV1, SnapshotV2, VersionedSnapshot};
pub use notebook::{MeasOption, Notebook, QubitNote};
pub use snapshot::{register_device, CalibrationSnapshot, ChipMeta, DeviceIdentity};
pub use store::SnapshotStore;
pub use waveform::{DrivePulse, PulseShape, WaveformLibrary};

// ============================================================================
// Prelude
// ============================================================================

/// Convenient imports for common use cases
pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! ```rust
    //! use qdrive_calibration::prelude::*;
    //! ```

    pub use crate::discriminator::{DiscriminatorBank, DiscriminatorModel};
    pub use crate::flux::{FluxBias, FluxBiasTable};
    pub use crate::migration::VersionedSnapshot;
    pub use crate::notebook::{Notebook, QubitNote};
    pub use crate::snapshot::{register_device, CalibrationSnapshot, ChipMeta, DeviceIdentity};
    pub use crate::store::SnapshotStore;
    pub use crate::waveform::{DrivePulse, PulseShape, WaveformLibrary};
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use qdrive_core::{ElementId, IqPoint, PortSpec, QdriveError};
    use std::collections::BTreeMap;

    fn five_qubit_specs() -> Vec<PortSpec> {
        let mut specs = Vec::new();
        for q in 0..5u32 {
            specs.push(PortSpec::new(&format!("q{}:mw", q), 2 + q / 2, q % 2));
            specs.push(PortSpec::new(&format!("q{}:res", q), 18, 0));
            specs.push(PortSpec::new(&format!("q{}:fl", q), 10, q));
        }
        for c in 0..4u32 {
            specs.push(PortSpec::new(&format!("c{}:fl", c), 12, c));
        }
        specs
    }

    #[test]
    fn test_register_save_load_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let chip = ChipMeta::new("5Q4C_A", "5Q4C", 5, 4);
        let mut snap = register_device(&five_qubit_specs(), "192.168.1.81", "dr4", chip).unwrap();

        assert_eq!(snap.couplers().len(), 4);
        assert_eq!(snap.flux.coupler_biases().len(), 4);

        let mut refs = BTreeMap::new();
        refs.insert(ElementId::Qubit(3), IqPoint::new(1e-3, -2e-3));
        snap.memo_ref_iq(&refs).unwrap();
        snap.flux.set_sweet_spot(ElementId::Qubit(3), 0.07);

        let path = dir.path().join(snap.file_name());
        SnapshotStore::save(&snap, &path).unwrap();
        let loaded = SnapshotStore::load(&path).unwrap();

        assert_eq!(loaded, snap);
        assert_eq!(loaded.flux.proper_bias(ElementId::Qubit(3)).unwrap(), 0.07);
    }

    #[test]
    fn test_every_qubit_has_defaults() {
        let chip = ChipMeta::new("5Q", "5Q", 5, 0);
        let specs: Vec<PortSpec> = five_qubit_specs()
            .into_iter()
            .filter(|s| s.port.starts_with('q'))
            .collect();
        let snap = register_device(&specs, "10.1.1.7", "DR1", chip).unwrap();

        assert_eq!(snap.notebook.len(), 5);
        for q in snap.qubits() {
            let note = snap.notebook.note(q).unwrap();
            assert_eq!(note.readout_freq, 6e9);
            assert_eq!(note.drive_freq, 4e9);
            assert!(snap.topology.flux_channel(q).unwrap().is_some());
        }
    }

    #[test]
    fn test_coupler_ports_need_coupler_count() {
        let chip = ChipMeta::new("5Q", "5Q", 5, 0);
        let err = register_device(&five_qubit_specs(), "10.1.1.7", "DR1", chip).unwrap_err();
        assert!(matches!(err, QdriveError::TopologyResolution(_)));
    }
}
