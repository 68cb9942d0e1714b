//! Snapshot schema migration
//!
//! Gantree: L2_Calibration → Migration
//!
//! Linear migration over explicit versioned structs:
//!
//! ```text
//! SnapshotV1 (legacy flat layout) → SnapshotV2 (structured) → CalibrationSnapshot (v3)
//! ```
//!
//! Every step is a pure function; migrating a current snapshot is a no-op.

use crate::flux::{FluxBias, FluxBiasTable};
use crate::notebook::{Notebook, QubitNote};
use crate::snapshot::{identity_of, CalibrationSnapshot, DeviceIdentity};
use crate::waveform::WaveformLibrary;
use qdrive_core::constants::schema;
use qdrive_core::{ElementId, HardwareTopology, IqPoint, QdriveError, QdriveResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Version 1 (legacy flat layout)
// ============================================================================

/// Chip block of the legacy layout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegacyChipInfo {
    /// Chip name
    #[serde(default)]
    pub name: String,
    /// Chip type
    #[serde(rename = "type", default)]
    pub chip_type: String,
}

/// Per-qubit notes of the legacy layout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegacyNoteV1 {
    /// Readout attenuation
    #[serde(default)]
    pub ro_atte: Option<f64>,
    /// Drive attenuation
    #[serde(default)]
    pub xy_atte: Option<f64>,
    /// Bare cavity frequency
    #[serde(default)]
    pub bare_freq: Option<f64>,
    /// Recorded T1 values
    #[serde(rename = "T1", default)]
    pub t1: Vec<f64>,
    /// Recorded T2 values
    #[serde(rename = "T2", default)]
    pub t2: Vec<f64>,
    /// Drive IF
    #[serde(default)]
    pub xy_if: Option<f64>,
}

/// Per-qubit device parameters of the legacy layout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegacyElementV1 {
    /// Readout frequency
    #[serde(default)]
    pub ro_freq: Option<f64>,
    /// Drive frequency
    #[serde(default)]
    pub xy_freq: Option<f64>,
    /// Readout pulse amplitude
    #[serde(default)]
    pub ro_amp: Option<f64>,
    /// Pi amplitude
    #[serde(default)]
    pub pi_amp: Option<f64>,
    /// Pi duration
    #[serde(default)]
    pub pi_dura: Option<f64>,
    /// Reset duration
    #[serde(default)]
    pub reset_dura: Option<f64>,
}

/// Legacy flat snapshot (no version tag)
/// Gantree: SnapshotV1 // 레거시 스키마
///
/// Element counts are implied by the `Flux`, `Note` and `QD` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotV1 {
    /// Chip name/type
    #[serde(default)]
    pub chip_info: LegacyChipInfo,
    /// Device identity string
    #[serde(rename = "ID")]
    pub id: String,
    /// Cluster address
    #[serde(rename = "IP")]
    pub ip: String,
    /// Free-text log
    #[serde(rename = "Log", default)]
    pub log: String,
    /// Sweet-spot bias per element name
    #[serde(rename = "Flux", default)]
    pub flux: BTreeMap<String, f64>,
    /// Notes per qubit name
    #[serde(rename = "Note", default)]
    pub note: BTreeMap<String, LegacyNoteV1>,
    /// Hardware configuration graph
    #[serde(rename = "Hcfg", default)]
    pub hcfg: Value,
    /// Reference IQ as [I, Q]
    #[serde(rename = "refIQ", default)]
    pub ref_iq: BTreeMap<String, Vec<f64>>,
    /// Rotation angles as lists
    #[serde(rename = "rota_angle", default)]
    pub rota_angle: BTreeMap<String, Vec<f64>>,
    /// Device parameters per qubit name
    #[serde(rename = "QD", default)]
    pub device: BTreeMap<String, LegacyElementV1>,
}

// ============================================================================
// Version 2 (structured, list angles, no discriminators)
// ============================================================================

/// Structured snapshot before discrimination models were stored
/// Gantree: SnapshotV2 // 구조화 스키마
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotV2 {
    /// Schema version (2)
    pub schema_version: u32,
    /// Device identity
    pub device: DeviceIdentity,
    /// Number of qubits
    pub qubit_count: usize,
    /// Number of couplers
    pub coupler_count: usize,
    /// Topology graph
    pub topology: HardwareTopology,
    /// Notebook
    pub notebook: Notebook,
    /// Flux biases
    pub flux: FluxBiasTable,
    /// Waveform metadata
    pub waveforms: WaveformLibrary,
    /// Reference points
    pub ref_iq: BTreeMap<ElementId, IqPoint>,
    /// Rotation angles as lists
    pub rotation_angle: BTreeMap<ElementId, Vec<f64>>,
    /// Free-text log
    pub log: String,
}

// ============================================================================
// Migration Steps
// ============================================================================

fn corrupt(msg: String) -> QdriveError {
    QdriveError::CorruptSnapshot(msg)
}

fn parse_element(name: &str) -> QdriveResult<ElementId> {
    ElementId::parse(name).map_err(|_| corrupt(format!("invalid element name '{}'", name)))
}

/// Qubit and coupler counts implied by the highest index named
fn element_counts<'a, I: Iterator<Item = &'a String>>(names: I) -> QdriveResult<(usize, usize)> {
    let mut qubits = 0;
    let mut couplers = 0;
    for name in names {
        match parse_element(name)? {
            ElementId::Qubit(i) => qubits = qubits.max(i + 1),
            ElementId::Coupler(i) => couplers = couplers.max(i + 1),
        }
    }
    Ok((qubits, couplers))
}

/// Migrate the legacy flat layout to version 2
/// Gantree: migrate_v1_to_v2(v1) -> V2 // 1→2
pub fn migrate_v1_to_v2(v1: &SnapshotV1) -> QdriveResult<SnapshotV2> {
    let mut flux = FluxBiasTable::default();
    for (name, bias) in &v1.flux {
        flux.set(parse_element(name)?, FluxBias::at(*bias));
    }
    let (flux_qubits, _) = element_counts(v1.flux.keys())?;
    let (qubit_count, coupler_count) =
        element_counts(v1.flux.keys().chain(v1.note.keys()).chain(v1.device.keys()))?;
    if qubit_count != flux_qubits {
        log::warn!(
            "Legacy snapshot {} lists {} qubit(s) under Flux but {} overall",
            v1.id,
            flux_qubits,
            qubit_count
        );
    }
    for q in 0..qubit_count {
        if flux.get(ElementId::Qubit(q)).is_none() {
            flux.set(ElementId::Qubit(q), FluxBias::default());
        }
    }
    for c in 0..coupler_count {
        if flux.get(ElementId::Coupler(c)).is_none() {
            flux.set(ElementId::Coupler(c), FluxBias::default());
        }
    }

    let mut notebook = Notebook::default();
    for q in 0..qubit_count {
        let name = format!("q{}", q);
        let mut note = QubitNote::default();
        if let Some(legacy) = v1.note.get(&name) {
            note.readout_atte = legacy.ro_atte.unwrap_or(note.readout_atte);
            note.drive_atte = legacy.xy_atte.unwrap_or(note.drive_atte);
            note.drive_if = legacy.xy_if.unwrap_or(note.drive_if);
            note.bare_cavity_freq = legacy.bare_freq;
            note.t1_history = legacy.t1.clone();
            note.t2_history = legacy.t2.clone();
        }
        if let Some(element) = v1.device.get(&name) {
            note.readout_freq = element.ro_freq.unwrap_or(note.readout_freq);
            note.drive_freq = element.xy_freq.unwrap_or(note.drive_freq);
            note.readout_pulse_amp = element.ro_amp.unwrap_or(note.readout_pulse_amp);
            note.pi_amp = element.pi_amp.unwrap_or(note.pi_amp);
            note.pi_duration = element.pi_dura.unwrap_or(note.pi_duration);
            note.reset_duration = element.reset_dura.unwrap_or(note.reset_duration);
        }
        notebook.insert(ElementId::Qubit(q), note);
    }

    let mut ref_iq = BTreeMap::new();
    for q in 0..qubit_count {
        let point = match v1.ref_iq.get(&format!("q{}", q)).map(Vec::as_slice) {
            None => IqPoint::default(),
            Some([i, qv]) => IqPoint::new(*i, *qv),
            Some(other) => {
                return Err(corrupt(format!(
                    "refIQ of q{} has {} values, expected 2",
                    q,
                    other.len()
                )))
            }
        };
        ref_iq.insert(ElementId::Qubit(q), point);
    }

    let rotation_angle = (0..qubit_count)
        .map(|q| {
            let angles = v1
                .rota_angle
                .get(&format!("q{}", q))
                .cloned()
                .unwrap_or_else(|| vec![0.0]);
            (ElementId::Qubit(q), angles)
        })
        .collect();

    let drawer = v1.id.split('#').next().unwrap_or_default().to_string();
    let identity = if v1.id.contains('#') {
        v1.id.clone()
    } else {
        identity_of(&drawer, &v1.ip)
    };

    Ok(SnapshotV2 {
        schema_version: 2,
        device: DeviceIdentity {
            cluster_address: v1.ip.clone(),
            drawer,
            identity,
            chip_name: v1.chip_info.name.clone(),
            chip_type: v1.chip_info.chip_type.clone(),
        },
        qubit_count,
        coupler_count,
        topology: HardwareTopology::from_value(v1.hcfg.clone()),
        notebook,
        flux,
        waveforms: WaveformLibrary::with_qubits(qubit_count),
        ref_iq,
        rotation_angle,
        log: v1.log.clone(),
    })
}

/// Migrate version 2 to the current schema
/// Gantree: migrate_v2_to_v3(v2) -> Snapshot // 2→3
///
/// Only the first recorded rotation angle survives; discrimination models
/// start empty and active reset off.
pub fn migrate_v2_to_v3(v2: &SnapshotV2) -> CalibrationSnapshot {
    let rotation_angle = v2
        .rotation_angle
        .iter()
        .map(|(q, angles)| (*q, angles.first().copied().unwrap_or(0.0)))
        .collect();

    CalibrationSnapshot::from_parts(
        v2.device.clone(),
        v2.qubit_count,
        v2.coupler_count,
        v2.topology.clone(),
        v2.notebook.clone(),
        v2.flux.clone(),
        v2.waveforms.clone(),
        v2.ref_iq.clone(),
        rotation_angle,
        v2.log.clone(),
    )
}

// ============================================================================
// VersionedSnapshot
// ============================================================================

/// Snapshot at any known schema version
/// Gantree: VersionedSnapshot // 버전별 스냅샷
#[derive(Debug, Clone, PartialEq)]
pub enum VersionedSnapshot {
    /// Legacy flat layout
    V1(SnapshotV1),
    /// Structured layout
    V2(SnapshotV2),
    /// Current layout
    Current(CalibrationSnapshot),
}

impl VersionedSnapshot {
    /// Detect the schema of a parsed document and deserialize it
    pub fn from_value(value: Value) -> QdriveResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| corrupt("snapshot root is not an object".to_string()))?;

        match object.get("schema_version") {
            Some(v) => {
                let version = v.as_u64().ok_or_else(|| {
                    corrupt(format!("schema_version {} is not an integer", v))
                })?;
                match version {
                    3 => serde_json::from_value(value)
                        .map(VersionedSnapshot::Current)
                        .map_err(|e| corrupt(e.to_string())),
                    2 => serde_json::from_value(value)
                        .map(VersionedSnapshot::V2)
                        .map_err(|e| corrupt(e.to_string())),
                    other => Err(QdriveError::VersionMismatch {
                        found: other.to_string(),
                        expected: schema::CURRENT_VERSION,
                    }),
                }
            }
            // The legacy layout carries no tag; its "ID" key identifies it.
            None if object.contains_key("ID") => serde_json::from_value(value)
                .map(VersionedSnapshot::V1)
                .map_err(|e| corrupt(e.to_string())),
            None => Err(QdriveError::VersionMismatch {
                found: "untagged".to_string(),
                expected: schema::CURRENT_VERSION,
            }),
        }
    }

    /// Schema version number
    pub fn version(&self) -> u32 {
        match self {
            VersionedSnapshot::V1(_) => 1,
            VersionedSnapshot::V2(_) => 2,
            VersionedSnapshot::Current(s) => s.version(),
        }
    }

    /// Check if the snapshot needs migration
    pub fn is_current(&self) -> bool {
        matches!(self, VersionedSnapshot::Current(_))
    }

    /// Advance one schema version (no-op at current)
    pub fn step(self) -> QdriveResult<Self> {
        match self {
            VersionedSnapshot::V1(v1) => migrate_v1_to_v2(&v1).map(VersionedSnapshot::V2),
            VersionedSnapshot::V2(v2) => Ok(VersionedSnapshot::Current(migrate_v2_to_v3(&v2))),
            current @ VersionedSnapshot::Current(_) => Ok(current),
        }
    }

    /// Migrate until current
    /// Gantree: into_current() -> Snapshot // 마이그레이션 체인
    pub fn into_current(self) -> QdriveResult<CalibrationSnapshot> {
        let mut state = self;
        loop {
            state = match state {
                VersionedSnapshot::Current(snapshot) => return Ok(snapshot),
                older => {
                    let from = older.version();
                    let next = older.step()?;
                    log::debug!("Migrated snapshot schema v{} -> v{}", from, next.version());
                    next
                }
            };
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
