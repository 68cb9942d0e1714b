//! Calibration snapshot
//!
//! Gantree: L2_Calibration → CalibrationSnapshot
//!
//! Durable aggregate of every tunable per-qubit/per-coupler parameter of one
//! device. Created once at registration; element counts are fixed after that.

use crate::discriminator::DiscriminatorBank;
use crate::flux::FluxBiasTable;
use crate::notebook::Notebook;
use crate::waveform::WaveformLibrary;
use chrono::Utc;
use qdrive_core::constants::schema;
use qdrive_core::{
    ElementId, HardwareTopology, IqPoint, IqReference, PortSpec, QdriveError, QdriveResult,
    TopologyComposer,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Device Identity
// ============================================================================

/// Chip description supplied at registration
/// Gantree: ChipMeta // 칩 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipMeta {
    /// Chip name
    pub name: String,
    /// Chip type (e.g. "5Q4C")
    pub chip_type: String,
    /// Number of qubits
    pub qubits: usize,
    /// Number of couplers
    pub couplers: usize,
}

impl ChipMeta {
    /// Create new chip description
    pub fn new(name: &str, chip_type: &str, qubits: usize, couplers: usize) -> Self {
        Self {
            name: name.to_string(),
            chip_type: chip_type.to_string(),
            qubits,
            couplers,
        }
    }
}

/// Identity of the device a snapshot belongs to
/// Gantree: DeviceIdentity // 장치 식별
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Control cluster network address
    pub cluster_address: String,
    /// Drawer (fridge) id, e.g. "DR4"
    pub drawer: String,
    /// `{DRAWER}#{last address octet}`, e.g. "DR4#81"
    pub identity: String,
    /// Chip name
    pub chip_name: String,
    /// Chip type
    pub chip_type: String,
}

impl DeviceIdentity {
    /// Build identity from address, drawer and chip
    pub fn new(cluster_address: &str, drawer: &str, chip: &ChipMeta) -> Self {
        Self {
            cluster_address: cluster_address.to_string(),
            drawer: drawer.to_string(),
            identity: identity_of(drawer, cluster_address),
            chip_name: chip.name.clone(),
            chip_type: chip.chip_type.clone(),
        }
    }
}

/// `DR4` + `192.168.1.81` → `DR4#81`
pub fn identity_of(drawer: &str, cluster_address: &str) -> String {
    let suffix = cluster_address.rsplit('.').next().unwrap_or(cluster_address);
    format!("{}#{}", drawer.to_uppercase(), suffix)
}

// ============================================================================
// CalibrationSnapshot
// ============================================================================

/// Versioned calibration aggregate of one device
/// Gantree: CalibrationSnapshot // 캘리브레이션 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    /// Schema version tag
    /// Gantree: schema_version: u32 // 스키마 버전
    schema_version: u32,

    /// Device identity
    pub device: DeviceIdentity,

    qubit_count: usize,
    coupler_count: usize,

    /// Hardware topology graph
    pub topology: HardwareTopology,

    /// Per-qubit notebook
    /// Gantree: notebook: Notebook // 노트북
    pub notebook: Notebook,

    /// Flux bias table
    pub flux: FluxBiasTable,

    /// Waveform metadata
    pub waveforms: WaveformLibrary,

    /// Ground-state IQ reference point per qubit
    pub ref_iq: BTreeMap<ElementId, IqPoint>,

    /// IQ rotation angle per qubit (degrees, 0 = unset)
    pub rotation_angle: BTreeMap<ElementId, f64>,

    /// Learned discrimination models
    pub discriminators: DiscriminatorBank,

    /// Active reset enabled
    pub active_reset: bool,

    /// Free-text log
    pub log: String,
}

impl CalibrationSnapshot {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Fresh snapshot with per-qubit defaults
    pub(crate) fn fresh(device: DeviceIdentity, chip: &ChipMeta, topology: HardwareTopology) -> Self {
        let qubits: Vec<ElementId> = (0..chip.qubits).map(ElementId::Qubit).collect();
        let couplers = (0..chip.couplers).map(ElementId::Coupler);

        Self {
            schema_version: schema::CURRENT_VERSION,
            device,
            qubit_count: chip.qubits,
            coupler_count: chip.couplers,
            topology,
            notebook: Notebook::with_qubits(chip.qubits),
            flux: FluxBiasTable::zeroed(qubits.iter().copied().chain(couplers)),
            waveforms: WaveformLibrary::with_qubits(chip.qubits),
            ref_iq: qubits.iter().map(|q| (*q, IqPoint::default())).collect(),
            rotation_angle: qubits.iter().map(|q| (*q, 0.0)).collect(),
            discriminators: DiscriminatorBank::default(),
            active_reset: false,
            log: String::new(),
        }
    }

    /// Assemble a snapshot from migrated parts
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        device: DeviceIdentity,
        qubit_count: usize,
        coupler_count: usize,
        topology: HardwareTopology,
        notebook: Notebook,
        flux: FluxBiasTable,
        waveforms: WaveformLibrary,
        ref_iq: BTreeMap<ElementId, IqPoint>,
        rotation_angle: BTreeMap<ElementId, f64>,
        log: String,
    ) -> Self {
        Self {
            schema_version: schema::CURRENT_VERSION,
            device,
            qubit_count,
            coupler_count,
            topology,
            notebook,
            flux,
            waveforms,
            ref_iq,
            rotation_angle,
            discriminators: DiscriminatorBank::default(),
            active_reset: false,
            log,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Schema version
    pub fn version(&self) -> u32 {
        self.schema_version
    }

    /// Number of qubits
    pub fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    /// Number of couplers
    pub fn coupler_count(&self) -> usize {
        self.coupler_count
    }

    /// Every qubit in index order
    pub fn qubits(&self) -> Vec<ElementId> {
        (0..self.qubit_count).map(ElementId::Qubit).collect()
    }

    /// Every coupler in index order
    pub fn couplers(&self) -> Vec<ElementId> {
        (0..self.coupler_count).map(ElementId::Coupler).collect()
    }

    /// Check an element lies inside the registered counts
    pub fn check_element(&self, element: ElementId) -> QdriveResult<()> {
        let known = match element {
            ElementId::Qubit(i) => i < self.qubit_count,
            ElementId::Coupler(i) => i < self.coupler_count,
        };
        if known {
            Ok(())
        } else {
            Err(QdriveError::UnknownElement {
                element: element.to_string(),
            })
        }
    }

    /// Snapshot file name, `{identity}_SumInfo.json`
    pub fn file_name(&self) -> String {
        format!("{}{}.json", self.device.identity, schema::SNAPSHOT_SUFFIX)
    }

    // ========================================================================
    // IQ References
    // ========================================================================

    /// IQ reduction reference of a qubit
    /// Gantree: reference_for(q) -> IqReference // 기준점 선택
    ///
    /// A recorded non-zero rotation angle wins; otherwise the ground-state
    /// reference point is used.
    pub fn reference_for(&self, qubit: ElementId) -> QdriveResult<IqReference> {
        self.check_element(qubit)?;
        let angle = self.rotation_angle.get(&qubit).copied().unwrap_or(0.0);
        if angle != 0.0 {
            return Ok(IqReference::Rotation(angle));
        }
        Ok(IqReference::TwoPoint(
            self.ref_iq.get(&qubit).copied().unwrap_or_default(),
        ))
    }

    /// Record ground-state reference points
    pub fn memo_ref_iq(&mut self, refs: &BTreeMap<ElementId, IqPoint>) -> QdriveResult<()> {
        for (qubit, point) in refs {
            self.check_element(*qubit)?;
            self.ref_iq.insert(*qubit, *point);
        }
        Ok(())
    }

    /// Record IQ rotation angles (degrees)
    pub fn memo_rotation_angle(&mut self, angles: &BTreeMap<ElementId, f64>) -> QdriveResult<()> {
        for (qubit, angle) in angles {
            self.check_element(*qubit)?;
            self.rotation_angle.insert(*qubit, *angle);
        }
        Ok(())
    }

    /// Replace the free-text log, stamping the time
    pub fn refresh_log(&mut self, message: &str) {
        self.log = format!("[{}] {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), message);
    }
}

impl fmt::Display for CalibrationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationSnapshot({}, chip={}, {}Q/{}C, v{})",
            self.device.identity,
            self.device.chip_name,
            self.qubit_count,
            self.coupler_count,
            self.schema_version
        )
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Register a new device and build its first snapshot
/// Gantree: register_device(specs,addr,drawer,chip) -> Snapshot // 장치 등록
///
/// Every declared port must resolve to exactly one physical channel and
/// belong to an element inside the chip's counts.
pub fn register_device(
    topology_spec: &[PortSpec],
    cluster_address: &str,
    drawer: &str,
    chip: ChipMeta,
) -> QdriveResult<CalibrationSnapshot> {
    if cluster_address.trim().is_empty() {
        return Err(QdriveError::ParameterValidation(
            "cluster address is empty".to_string(),
        ));
    }
    if drawer.trim().is_empty() {
        return Err(QdriveError::ParameterValidation("drawer id is empty".to_string()));
    }
    if chip.qubits == 0 {
        return Err(QdriveError::ParameterValidation(
            "a device needs at least one qubit".to_string(),
        ));
    }

    let topology = TopologyComposer::compose(topology_spec, drawer)?;
    topology.validate()?;

    for element in topology.elements()? {
        let inside = match element {
            ElementId::Qubit(i) => i < chip.qubits,
            ElementId::Coupler(i) => i < chip.couplers,
        };
        if !inside {
            return Err(QdriveError::TopologyResolution(format!(
                "topology declares {} but chip has {} qubits and {} couplers",
                element, chip.qubits, chip.couplers
            )));
        }
    }

    let device = DeviceIdentity::new(cluster_address, drawer, &chip);
    let snapshot = CalibrationSnapshot::fresh(device, &chip, topology);
    log::info!("Registered device {}", snapshot);
    Ok(snapshot)
}

// ============================================================================
// Tests
// ============================================================================
