//! Waveform library metadata
//!
//! Gantree: L2_Calibration → WaveformLibrary

use qdrive_core::ElementId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Drive pulse envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PulseShape {
    /// Gaussian envelope
    Gauss,
    /// Gaussian with derivative correction
    #[default]
    Drag,
    /// Flat top
    Square,
}

/// Drive pulse description of one qubit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrivePulse {
    /// Envelope shape
    pub shape: PulseShape,
    /// Pulse duration over gaussian sigma
    pub sigma_ratio: f64,
}

impl Default for DrivePulse {
    fn default() -> Self {
        Self {
            shape: PulseShape::Drag,
            sigma_ratio: 4.0,
        }
    }
}

/// Waveform metadata for every qubit
/// Gantree: WaveformLibrary // 파형 라이브러리
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaveformLibrary {
    drive: BTreeMap<ElementId, DrivePulse>,
}

impl WaveformLibrary {
    /// Library with default pulses for `count` qubits
    pub fn with_qubits(count: usize) -> Self {
        Self {
            drive: (0..count)
                .map(|q| (ElementId::Qubit(q), DrivePulse::default()))
                .collect(),
        }
    }

    /// Drive pulse of a qubit, default when none is recorded
    pub fn pulse(&self, qubit: ElementId) -> DrivePulse {
        self.drive.get(&qubit).copied().unwrap_or_default()
    }

    /// Record a drive pulse
    pub fn set_pulse(&mut self, qubit: ElementId, pulse: DrivePulse) {
        self.drive.insert(qubit, pulse);
    }
}
