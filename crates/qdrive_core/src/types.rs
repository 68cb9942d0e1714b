//! Core types for QDrive
//!
//! Gantree: L0_Foundation → CoreTypes
//!
//! Addressable control elements, logical ports, IQ-plane points and the
//! closed set of experiment tags shared by every crate.

use crate::error::{QdriveError, QdriveResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// Frequency in hertz
/// Gantree: Hertz // pub type Hertz = f64
pub type Hertz = f64;

/// Duration in seconds
/// Gantree: Seconds // pub type Seconds = f64
pub type Seconds = f64;

/// Bias voltage in volts
pub type Volts = f64;

/// Attenuation in dB
pub type Decibel = f64;

// ============================================================================
// ElementId
// ============================================================================

/// Addressable control target (qubit or coupler)
/// Gantree: ElementId // "q0", "c1"
///
/// Ordered qubits first, then couplers, each by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementId {
    /// Qubit by index
    Qubit(usize),
    /// Coupler by index
    Coupler(usize),
}

impl ElementId {
    /// Parse from "q0" / "c1"
    /// Gantree: parse(s) -> Self // 파싱
    pub fn parse(s: &str) -> QdriveResult<Self> {
        let s = s.trim();
        let (prefix, digits) = s.split_at(s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(0));
        let index: usize = digits
            .parse()
            .map_err(|_| QdriveError::InvalidElement(s.to_string()))?;
        match prefix {
            "q" => Ok(ElementId::Qubit(index)),
            "c" => Ok(ElementId::Coupler(index)),
            _ => Err(QdriveError::InvalidElement(s.to_string())),
        }
    }

    /// Element index
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            ElementId::Qubit(i) | ElementId::Coupler(i) => *i,
        }
    }

    /// Check if element is a qubit
    #[inline]
    pub fn is_qubit(&self) -> bool {
        matches!(self, ElementId::Qubit(_))
    }

    /// Check if element is a coupler
    #[inline]
    pub fn is_coupler(&self) -> bool {
        matches!(self, ElementId::Coupler(_))
    }

    /// Logical port of the given kind on this element
    pub fn port(&self, kind: PortKind) -> PortName {
        PortName::new(*self, kind)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Qubit(i) => write!(f, "q{}", i),
            ElementId::Coupler(i) => write!(f, "c{}", i),
        }
    }
}

impl FromStr for ElementId {
    type Err = QdriveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Serialized as its string form so element-keyed maps stay readable on disk.
impl Serialize for ElementId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ElementId::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Ports
// ============================================================================

/// Logical port kind on an element
/// Gantree: PortKind // mw/res/fl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PortKind {
    /// Microwave drive (":mw")
    Drive,
    /// Readout resonator (":res")
    Readout,
    /// Flux line (":fl")
    Flux,
}

impl PortKind {
    /// Port suffix used in topology graphs
    pub fn suffix(&self) -> &'static str {
        match self {
            PortKind::Drive => "mw",
            PortKind::Readout => "res",
            PortKind::Flux => "fl",
        }
    }

    /// Parse a port suffix
    pub fn from_suffix(suffix: &str) -> QdriveResult<Self> {
        match suffix {
            "mw" => Ok(PortKind::Drive),
            "res" => Ok(PortKind::Readout),
            "fl" => Ok(PortKind::Flux),
            other => Err(QdriveError::ParameterValidation(format!(
                "unsupported port suffix ':{}' (expected mw, res or fl)",
                other
            ))),
        }
    }
}

/// Logical port name, e.g. "q0:mw"
/// Gantree: PortName // element + kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortName {
    /// Owning element
    pub element: ElementId,
    /// Port kind
    pub kind: PortKind,
}

impl PortName {
    /// Create new port name
    pub fn new(element: ElementId, kind: PortKind) -> Self {
        Self { element, kind }
    }

    /// Parse "q0:mw"
    pub fn parse(s: &str) -> QdriveResult<Self> {
        let (element, suffix) = s.split_once(':').ok_or_else(|| {
            QdriveError::ParameterValidation(format!("port '{}' has no ':' separator", s))
        })?;
        Ok(Self::new(
            ElementId::parse(element)?,
            PortKind::from_suffix(suffix)?,
        ))
    }

    /// Clock this port is driven with
    /// Gantree: clock() -> String // q0.01 / q0.ro / cl0.baseband
    pub fn clock(&self) -> String {
        match self.kind {
            PortKind::Drive => format!("{}.01", self.element),
            PortKind::Readout => format!("{}.ro", self.element),
            PortKind::Flux => "cl0.baseband".to_string(),
        }
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.element, self.kind.suffix())
    }
}

// ============================================================================
// IQ Plane
// ============================================================================

/// Point in the IQ plane
/// Gantree: IqPoint // (I, Q)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IqPoint {
    /// In-phase component
    pub i: f64,
    /// Quadrature component
    pub q: f64,
}

impl IqPoint {
    /// Create new point
    pub const fn new(i: f64, q: f64) -> Self {
        Self { i, q }
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn distance(&self, other: &IqPoint) -> f64 {
        ((self.i - other.i).powi(2) + (self.q - other.q).powi(2)).sqrt()
    }

    /// Magnitude |I + iQ|
    #[inline]
    pub fn magnitude(&self) -> f64 {
        self.i.hypot(self.q)
    }

    /// Phase angle in degrees, range (-180, 180]
    #[inline]
    pub fn phase_deg(&self) -> f64 {
        self.q.atan2(self.i).to_degrees()
    }
}

/// Reference used to collapse IQ samples to one axis
/// Gantree: IqReference // 기준점 or 회전각
///
/// Exactly one form applies per element: a two-coordinate point
/// (distance reduction) or a single angle (rotation reduction).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IqReference {
    /// Ground-state reference point, reduce by Euclidean distance
    TwoPoint(IqPoint),
    /// Rotation angle in degrees, reduce by projection onto I
    Rotation(f64),
}

// ============================================================================
// Acquisition
// ============================================================================

/// Acquisition mode requested from the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AcquisitionMode {
    /// Hardware-averaged integration
    #[default]
    Averaged,
    /// Per-shot acquisition (buffer bound)
    SingleShot,
}

impl AcquisitionMode {
    /// Check if samples are stored per shot
    pub fn is_per_shot(&self) -> bool {
        matches!(self, AcquisitionMode::SingleShot)
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionMode::Averaged => write!(f, "averaged"),
            AcquisitionMode::SingleShot => write!(f, "single_shot"),
        }
    }
}

// ============================================================================
// ExperimentTag
// ============================================================================

/// Tag identifying an experiment kind (dataset names, analysis registry keys)
/// Gantree: ExperimentTag // 실험 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExperimentTag {
    /// Readout resonator search
    CavitySearch,
    /// Ground-state IQ reference
    IqReference,
    /// Drive amplitude Rabi
    PowerRabi,
    /// Drive duration Rabi
    TimeRabi,
    /// Ramsey fringes
    Ramsey,
    /// Hahn echo
    SpinEcho,
    /// Energy relaxation
    EnergyRelaxation,
    /// Single-shot readout
    SingleShot,
    /// Drive frequency calibration
    DriveFreqCali,
    /// Readout frequency calibration
    ReadoutFreqCali,
    /// Pi amplitude calibration
    PiAmpCali,
    /// DRAG coefficient calibration
    DragCali,
    /// Continuous two-tone qubit spectroscopy
    TwoTone,
    /// Resonator response against flux bias
    FluxCavity,
    /// Qubit response against flux bias
    FluxQubit,
    /// Carr-Purcell-Meiboom-Gill echo train
    Cpmg,
}

impl ExperimentTag {
    /// Every tag, in registry order
    pub const ALL: [ExperimentTag; 16] = [
        ExperimentTag::CavitySearch,
        ExperimentTag::IqReference,
        ExperimentTag::PowerRabi,
        ExperimentTag::TimeRabi,
        ExperimentTag::Ramsey,
        ExperimentTag::SpinEcho,
        ExperimentTag::EnergyRelaxation,
        ExperimentTag::SingleShot,
        ExperimentTag::DriveFreqCali,
        ExperimentTag::ReadoutFreqCali,
        ExperimentTag::PiAmpCali,
        ExperimentTag::DragCali,
        ExperimentTag::TwoTone,
        ExperimentTag::FluxCavity,
        ExperimentTag::FluxQubit,
        ExperimentTag::Cpmg,
    ];

    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentTag::CavitySearch => "CavitySearch",
            ExperimentTag::IqReference => "IQref",
            ExperimentTag::PowerRabi => "PowerRabi",
            ExperimentTag::TimeRabi => "TimeRabi",
            ExperimentTag::Ramsey => "Ramsey",
            ExperimentTag::SpinEcho => "SpinEcho",
            ExperimentTag::EnergyRelaxation => "T1",
            ExperimentTag::SingleShot => "SingleShot",
            ExperimentTag::DriveFreqCali => "XYFcali",
            ExperimentTag::ReadoutFreqCali => "ROFcali",
            ExperimentTag::PiAmpCali => "PiAcali",
            ExperimentTag::DragCali => "DragCali",
            ExperimentTag::TwoTone => "Conti2tone",
            ExperimentTag::FluxCavity => "FluxCavity",
            ExperimentTag::FluxQubit => "FluxQubit",
            ExperimentTag::Cpmg => "CPMG",
        }
    }

    /// Parse the stable string form
    pub fn parse(s: &str) -> QdriveResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| QdriveError::UnknownAnalysisTag(s.to_string()))
    }

    /// Check if the tag calibrates a parameter rather than characterizing one
    pub fn is_calibration(&self) -> bool {
        matches!(
            self,
            ExperimentTag::DriveFreqCali
                | ExperimentTag::ReadoutFreqCali
                | ExperimentTag::PiAmpCali
                | ExperimentTag::DragCali
                | ExperimentTag::TwoTone
                | ExperimentTag::FluxCavity
                | ExperimentTag::FluxQubit
        )
    }
}

impl fmt::Display for ExperimentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExperimentTag {
    type Err = QdriveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Tests
// ============================================================================
