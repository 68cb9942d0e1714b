//! Spectroscopy
//!
//! Gantree: L5_Engine → Catalog → Spectroscopy
//!
//! Resonator search, continuous two-tone qubit search and the ground-state
//! IQ reference. Only the two-tone search needs a drive line.

use super::{frequency_window, require_averaging, require_targets, ElementRanges};
use crate::config::LifecycleConfig;
use crate::experiment::{element_sweep, CommitPolicy, Experiment, SweepPlan};
use crate::sampling::SamplingFunction;
use crate::update::{CalibrationUpdate, ParameterChange};
use qdrive_analysis::FitPack;
use qdrive_backend::ElementSweep;
use qdrive_calibration::CalibrationSnapshot;
use qdrive_core::{AcquisitionMode, ElementId, ExperimentTag, IqPoint, QdriveError, QdriveResult};
use std::collections::BTreeMap;

/// Linear sweeps over absolute frequency windows
fn window_sweeps(
    ranges: &ElementRanges,
    points: usize,
    config: &LifecycleConfig,
    line: &str,
) -> QdriveResult<Vec<ElementSweep>> {
    let sampling = SamplingFunction::Linear { points };
    let mut sweeps = Vec::with_capacity(ranges.len());
    for (element, (start, end)) in ranges {
        if *start <= 0.0 {
            return Err(QdriveError::ParameterValidation(format!(
                "{} {} window must be positive, got {}",
                element, line, start
            )));
        }
        let samples = sampling.samples(*start, *end)?;
        frequency_window(*element, *start, *end, config.max_frequency_span_hz)?;
        sweeps.push(element_sweep(*element, "freq", samples));
    }
    Ok(sweeps)
}

// ============================================================================
// CavitySearch
// ============================================================================

/// Zoomed resonator search over absolute frequency windows
/// Gantree: CavitySearch // 공진기 탐색
#[derive(Debug, Clone)]
pub struct CavitySearch {
    /// Readout frequency window per qubit (Hz)
    pub freq_ranges: ElementRanges,
    /// Samples per window
    pub points: usize,
    /// Averages
    pub averaging: u32,
}

impl CavitySearch {
    /// Create a search, 100 averages
    pub fn new(freq_ranges: ElementRanges, points: usize) -> Self {
        Self {
            freq_ranges,
            points,
            averaging: 100,
        }
    }

    /// Builder: averages
    pub fn with_averaging(mut self, averaging: u32) -> Self {
        self.averaging = averaging;
        self
    }
}

impl Experiment for CavitySearch {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::CavitySearch
    }

    fn derive_parameters(
        &self,
        _snapshot: &CalibrationSnapshot,
        config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.freq_ranges.len(), "cavity search")?;
        require_averaging(self.averaging)?;

        let sweeps = window_sweeps(&self.freq_ranges, self.points, config, "readout")?;
        Ok(SweepPlan::new(sweeps, self.averaging))
    }

    fn uses_drive(&self) -> bool {
        false
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::Confirm
    }

    fn propose_update(
        &self,
        element: ElementId,
        pack: &FitPack,
        _snapshot: &CalibrationSnapshot,
        _plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>> {
        Ok(Some(CalibrationUpdate::new(
            element,
            ParameterChange::DressedCavity(pack.scalar("resonance")?),
        )))
    }
}

// ============================================================================
// TwoToneSpectroscopy
// ============================================================================

/// Continuous-wave qubit search: drive tone swept while the readout tone
/// sits on the dressed cavity
/// Gantree: TwoToneSpectroscopy // 2톤 분광
#[derive(Debug, Clone)]
pub struct TwoToneSpectroscopy {
    /// Drive frequency window per qubit (Hz)
    pub freq_ranges: ElementRanges,
    /// Samples per window
    pub points: usize,
    /// Averages
    pub averaging: u32,
}

impl TwoToneSpectroscopy {
    /// Create a search, 100 averages
    pub fn new(freq_ranges: ElementRanges, points: usize) -> Self {
        Self {
            freq_ranges,
            points,
            averaging: 100,
        }
    }

    /// Builder: averages
    pub fn with_averaging(mut self, averaging: u32) -> Self {
        self.averaging = averaging;
        self
    }
}

impl Experiment for TwoToneSpectroscopy {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::TwoTone
    }

    fn derive_parameters(
        &self,
        _snapshot: &CalibrationSnapshot,
        config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.freq_ranges.len(), "two-tone")?;
        require_averaging(self.averaging)?;

        let sweeps = window_sweeps(&self.freq_ranges, self.points, config, "drive")?;
        Ok(SweepPlan::new(sweeps, self.averaging))
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::Confirm
    }

    fn propose_update(
        &self,
        element: ElementId,
        pack: &FitPack,
        _snapshot: &CalibrationSnapshot,
        _plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>> {
        Ok(Some(CalibrationUpdate::new(
            element,
            ParameterChange::DriveFreq(pack.scalar("qubit_freq")?),
        )))
    }
}

// ============================================================================
// IqReferenceExp
// ============================================================================

/// Ground-state IQ reference from undriven shots
/// Gantree: IqReferenceExp // IQ 기준점
#[derive(Debug, Clone)]
pub struct IqReferenceExp {
    /// Readout amplitude factor per qubit
    pub amp_factors: BTreeMap<ElementId, f64>,
    /// Shots per qubit
    pub shots: u32,
}

impl IqReferenceExp {
    /// Reference at unit readout amplitude
    pub fn new<I: IntoIterator<Item = ElementId>>(targets: I, shots: u32) -> Self {
        Self {
            amp_factors: targets.into_iter().map(|e| (e, 1.0)).collect(),
            shots,
        }
    }

    /// Builder: readout amplitude factor of one qubit
    pub fn with_amp_factor(mut self, element: ElementId, factor: f64) -> Self {
        self.amp_factors.insert(element, factor);
        self
    }
}

impl Experiment for IqReferenceExp {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::IqReference
    }

    fn derive_parameters(
        &self,
        _snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.amp_factors.len(), "IQ reference")?;
        require_averaging(self.shots)?;

        let mut sweeps = Vec::with_capacity(self.amp_factors.len());
        for (element, factor) in &self.amp_factors {
            if !(factor.is_finite() && *factor > 0.0) {
                return Err(QdriveError::ParameterValidation(format!(
                    "{} readout amplitude factor must be positive, got {}",
                    element, factor
                )));
            }
            sweeps.push(element_sweep(*element, "ro_amp_factor", vec![*factor]));
        }
        Ok(SweepPlan::new(sweeps, self.shots).with_acquisition(AcquisitionMode::SingleShot))
    }

    fn uses_drive(&self) -> bool {
        false
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::QualityGated
    }

    fn propose_update(
        &self,
        element: ElementId,
        pack: &FitPack,
        _snapshot: &CalibrationSnapshot,
        _plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>> {
        let point = IqPoint::new(pack.scalar("ref_i")?, pack.scalar("ref_q")?);
        if !(point.i.is_finite() && point.q.is_finite()) {
            log::warn!("{} reference IQ is not finite, kept the old one", element);
            return Ok(None);
        }
        Ok(Some(CalibrationUpdate::new(element, ParameterChange::RefIq(point))))
    }
}
