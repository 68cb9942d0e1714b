//! Per-qubit calibration notebook
//!
//! Gantree: L2_Calibration → Notebook
//!
//! Tunable readout and drive parameters per qubit, characterization
//! history, and named measurement option points that can be restored.

use qdrive_core::constants::hardware;
use qdrive_core::{Decibel, ElementId, Hertz, PortKind, QdriveError, QdriveResult, Seconds, Volts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Calibrated parameters of one qubit
/// Gantree: QubitNote // 큐비트 노트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QubitNote {
    /// Readout frequency
    /// Gantree: readout_freq: Hertz // 읽기 주파수
    pub readout_freq: Hertz,

    /// Drive (f01) frequency
    /// Gantree: drive_freq: Hertz // 구동 주파수
    pub drive_freq: Hertz,

    /// Readout output attenuation
    pub readout_atte: Decibel,

    /// Drive output attenuation
    pub drive_atte: Decibel,

    /// Readout pulse amplitude
    pub readout_pulse_amp: f64,

    /// Readout pulse duration
    pub readout_pulse_duration: Seconds,

    /// Delay between readout pulse and acquisition
    pub acq_delay: Seconds,

    /// Acquisition integration window
    pub integration_time: Seconds,

    /// Passive reset wait between shots
    pub reset_duration: Seconds,

    /// Pi-pulse amplitude
    /// Gantree: pi_amp: f64 // 파이 펄스 진폭
    pub pi_amp: f64,

    /// Pi-pulse duration
    pub pi_duration: Seconds,

    /// DRAG coefficient
    pub drag_coef: f64,

    /// Drive intermediate frequency
    pub drive_if: Hertz,

    /// Artificial detuning used by Ramsey-type experiments
    pub ramsey_detuning: Hertz,

    /// Bare cavity frequency (high readout power)
    #[serde(default)]
    pub bare_cavity_freq: Option<Hertz>,

    /// Dressed cavity frequency (low readout power)
    #[serde(default)]
    pub dressed_cavity_freq: Option<Hertz>,

    /// Committed T1 values
    #[serde(default)]
    pub t1_history: Vec<Seconds>,

    /// Committed Ramsey T2* values
    #[serde(default)]
    pub t2_history: Vec<Seconds>,

    /// Committed echo T2 values
    #[serde(default)]
    pub t2_echo_history: Vec<Seconds>,

    /// Saved measurement option points
    #[serde(default)]
    pub meas_options: BTreeMap<String, MeasOption>,
}

impl Default for QubitNote {
    fn default() -> Self {
        Self {
            readout_freq: hardware::READOUT_FREQ_HZ,
            drive_freq: hardware::DRIVE_FREQ_HZ,
            readout_atte: 0.0,
            drive_atte: 0.0,
            readout_pulse_amp: hardware::READOUT_PULSE_AMP,
            readout_pulse_duration: hardware::READOUT_PULSE_DURATION_S,
            acq_delay: hardware::ACQ_DELAY_S,
            integration_time: hardware::INTEGRATION_TIME_S,
            reset_duration: hardware::RESET_DURATION_S,
            pi_amp: hardware::PI_AMP,
            pi_duration: hardware::PI_DURATION_S,
            drag_coef: 0.0,
            drive_if: hardware::DRIVE_IF_HZ,
            ramsey_detuning: 0.0,
            bare_cavity_freq: None,
            dressed_cavity_freq: None,
            t1_history: Vec::new(),
            t2_history: Vec::new(),
            t2_echo_history: Vec::new(),
            meas_options: BTreeMap::new(),
        }
    }
}

impl QubitNote {
    // ========================================================================
    // Attenuation
    // ========================================================================

    /// Set output attenuation for a port kind
    ///
    /// Attenuation must be a non-negative multiple of the output step and at
    /// most the output maximum.
    pub fn set_attenuation(&mut self, kind: PortKind, db: Decibel) -> QdriveResult<()> {
        check_attenuation(db)?;
        match kind {
            PortKind::Readout => self.readout_atte = db,
            PortKind::Drive => self.drive_atte = db,
            PortKind::Flux => {
                return Err(QdriveError::ParameterValidation(
                    "flux outputs have no attenuation".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Drive local oscillator frequency (drive frequency minus IF)
    pub fn drive_lo(&self) -> Hertz {
        self.drive_freq - self.drive_if
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Most recently committed T1
    pub fn latest_t1(&self) -> Option<Seconds> {
        self.t1_history.last().copied()
    }

    /// Most recently committed T2*
    pub fn latest_t2(&self) -> Option<Seconds> {
        self.t2_history.last().copied()
    }

    // ========================================================================
    // Measurement Options
    // ========================================================================

    /// Save the current operating point under `name`
    /// Gantree: keep_option(name,bias) // 측정 옵션 저장
    pub fn keep_option(&mut self, name: &str, bias: Option<Volts>) {
        let option = MeasOption {
            readout_freq: self.readout_freq,
            drive_freq: self.drive_freq,
            readout_pulse_amp: self.readout_pulse_amp,
            pi_amp: self.pi_amp,
            pi_duration: self.pi_duration,
            readout_atte: self.readout_atte,
            drive_atte: self.drive_atte,
            bias,
        };
        self.meas_options.insert(name.to_string(), option);
    }

    /// Restore a saved operating point, returning its bias if one was kept
    /// Gantree: restore_option(name) -> Option<Volts> // 측정 옵션 복원
    pub fn restore_option(&mut self, name: &str) -> QdriveResult<Option<Volts>> {
        let option = self.meas_options.get(name).cloned().ok_or_else(|| {
            QdriveError::ParameterValidation(format!("no measurement option named '{}'", name))
        })?;
        self.readout_freq = option.readout_freq;
        self.drive_freq = option.drive_freq;
        self.readout_pulse_amp = option.readout_pulse_amp;
        self.pi_amp = option.pi_amp;
        self.pi_duration = option.pi_duration;
        self.readout_atte = option.readout_atte;
        self.drive_atte = option.drive_atte;
        Ok(option.bias)
    }
}

/// Validate an attenuation value
pub fn check_attenuation(db: Decibel) -> QdriveResult<()> {
    let steps = db / hardware::ATTENUATION_STEP_DB;
    if !(0.0..=hardware::MAX_ATTENUATION_DB).contains(&db) || (steps - steps.round()).abs() > 1e-9
    {
        return Err(QdriveError::ParameterValidation(format!(
            "attenuation {} dB must be a multiple of {} in [0, {}]",
            db,
            hardware::ATTENUATION_STEP_DB,
            hardware::MAX_ATTENUATION_DB
        )));
    }
    Ok(())
}

/// Saved operating point of a qubit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasOption {
    /// Readout frequency
    pub readout_freq: Hertz,
    /// Drive frequency
    pub drive_freq: Hertz,
    /// Readout pulse amplitude
    pub readout_pulse_amp: f64,
    /// Pi-pulse amplitude
    pub pi_amp: f64,
    /// Pi-pulse duration
    pub pi_duration: Seconds,
    /// Readout attenuation
    pub readout_atte: Decibel,
    /// Drive attenuation
    pub drive_atte: Decibel,
    /// Flux bias at this point
    pub bias: Option<Volts>,
}

// ============================================================================
// Notebook
// ============================================================================

/// Notebook of every registered qubit
/// Gantree: Notebook // 노트북
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notebook {
    notes: BTreeMap<ElementId, QubitNote>,
}

impl Notebook {
    /// Notebook with default notes for `count` qubits
    pub fn with_qubits(count: usize) -> Self {
        let notes = (0..count)
            .map(|q| (ElementId::Qubit(q), QubitNote::default()))
            .collect();
        Self { notes }
    }

    /// Insert or replace a note
    pub(crate) fn insert(&mut self, qubit: ElementId, note: QubitNote) {
        self.notes.insert(qubit, note);
    }

    /// Note of a qubit
    pub fn note(&self, qubit: ElementId) -> QdriveResult<&QubitNote> {
        self.notes.get(&qubit).ok_or(QdriveError::UnknownElement {
            element: qubit.to_string(),
        })
    }

    /// Mutable note of a qubit
    pub fn note_mut(&mut self, qubit: ElementId) -> QdriveResult<&mut QubitNote> {
        self.notes.get_mut(&qubit).ok_or(QdriveError::UnknownElement {
            element: qubit.to_string(),
        })
    }

    /// Number of notes
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Check if notebook is empty
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Iterate notes in element order
    pub fn iter(&self) -> impl Iterator<Item = (&ElementId, &QubitNote)> {
        self.notes.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
