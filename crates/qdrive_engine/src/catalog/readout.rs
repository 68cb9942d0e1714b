//! Readout calibration
//!
//! Gantree: L5_Engine → Catalog → Readout
//!
//! Single-shot discriminator training and readout frequency optimization.
//! Both prepare the ground and excited states.

use super::{frequency_window, require_averaging, require_targets, ElementRanges};
use crate::config::LifecycleConfig;
use crate::experiment::{element_sweep, CommitPolicy, Experiment, SweepPlan};
use crate::sampling::SamplingFunction;
use crate::update::{CalibrationUpdate, ParameterChange};
use qdrive_analysis::FitPack;
use qdrive_calibration::CalibrationSnapshot;
use qdrive_core::{AcquisitionMode, ElementId, ExperimentTag, IqPoint, QdriveResult};

// ============================================================================
// SingleShot
// ============================================================================

/// Ground/excited shot populations for discriminator training
/// Gantree: SingleShot // 단발 측정
#[derive(Debug, Clone)]
pub struct SingleShot {
    /// Measured qubits
    pub targets: Vec<ElementId>,
    /// Shots per state
    pub shots: u32,
}

impl SingleShot {
    /// Create new request
    pub fn new<I: IntoIterator<Item = ElementId>>(targets: I, shots: u32) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            shots,
        }
    }
}

impl Experiment for SingleShot {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::SingleShot
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.targets.len(), "single shot")?;
        require_averaging(self.shots)?;

        let mut plan = SweepPlan::new(
            self.targets
                .iter()
                .map(|e| element_sweep(*e, "index", vec![0.0]))
                .collect(),
            self.shots,
        )
        .with_acquisition(AcquisitionMode::SingleShot)
        .with_states(2);
        for element in &self.targets {
            let note = snapshot.notebook.note(*element)?;
            plan = plan
                .with_constant(*element, "pi_amp", note.pi_amp)
                .with_constant(*element, "pi_duration", note.pi_duration);
        }
        Ok(plan)
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
        let fidelity = pack.scalar("fidelity")?;
        log::info!(
            "{} assignment fidelity {:.3}, thermal population {:.3}",
            element,
            fidelity,
            pack.scalar("thermal_population")?
        );
        Ok(Some(CalibrationUpdate::discriminator(
            element,
            IqPoint::new(pack.scalar("ground_i")?, pack.scalar("ground_q")?),
            IqPoint::new(pack.scalar("excited_i")?, pack.scalar("excited_q")?),
            pack.scalar("rotation_deg")?,
            pack.scalar("threshold")?,
            fidelity,
        )))
    }
}

// ============================================================================
// ReadoutFreqCalibration
// ============================================================================

/// Readout frequency of largest ground/excited separation
/// Gantree: ReadoutFreqCalibration // 읽기 주파수 보정
#[derive(Debug, Clone)]
pub struct ReadoutFreqCalibration {
    /// Offset window around the current readout frequency per qubit (Hz)
    pub span_ranges: ElementRanges,
    /// Samples per window
    pub points: usize,
    /// Averages
    pub averaging: u32,
}

impl ReadoutFreqCalibration {
    /// Create with 100 averages
    pub fn new(span_ranges: ElementRanges, points: usize) -> Self {
        Self {
            span_ranges,
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

impl Experiment for ReadoutFreqCalibration {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::ReadoutFreqCali
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.span_ranges.len(), "readout frequency calibration")?;
        require_averaging(self.averaging)?;

        let sampling = SamplingFunction::Linear { points: self.points };
        let mut sweeps = Vec::with_capacity(self.span_ranges.len());
        for (element, (lo, hi)) in &self.span_ranges {
            frequency_window(*element, *lo, *hi, config.max_frequency_span_hz)?;
            let center = snapshot.notebook.note(*element)?.readout_freq;
            sweeps.push(element_sweep(
                *element,
                "freq",
                sampling.samples(center + lo, center + hi)?,
            ));
        }
        Ok(SweepPlan::new(sweeps, self.averaging).with_states(2))
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
            ParameterChange::ReadoutFreq(pack.scalar("optimal_rof")?),
        )))
    }
}
