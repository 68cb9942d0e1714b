//! Flux sweet-spot search
//!
//! Gantree: L5_Engine → Catalog → Flux
//!
//! Bias sweeps on the flux line of a tunable qubit. The cavity variant reads
//! the dressed resonator while the bias moves; the qubit variant drives at
//! the notebook frequency around the current operating bias. Both move the
//! sweet spot in the flux table.

use super::{require_averaging, require_targets, ElementRanges};
use crate::config::LifecycleConfig;
use crate::experiment::{element_sweep, CommitPolicy, Experiment, SweepPlan};
use crate::sampling::SamplingFunction;
use crate::update::{CalibrationUpdate, ParameterChange};
use qdrive_analysis::FitPack;
use qdrive_backend::ElementSweep;
use qdrive_calibration::CalibrationSnapshot;
use qdrive_core::constants::hardware::FLUX_OUTPUT_RANGE_V;
use qdrive_core::{ElementId, ExperimentTag, QdriveError, QdriveResult};

/// Absolute bias sweep on a qubit's flux line
fn bias_sweep(
    snapshot: &CalibrationSnapshot,
    element: ElementId,
    start: f64,
    end: f64,
    points: usize,
) -> QdriveResult<ElementSweep> {
    if snapshot.topology.flux_channel(element)?.is_none() {
        return Err(QdriveError::ParameterValidation(format!(
            "{} has no flux line",
            element
        )));
    }
    for bias in [start, end] {
        if !(bias.is_finite() && bias.abs() <= FLUX_OUTPUT_RANGE_V) {
            return Err(QdriveError::ParameterValidation(format!(
                "{} bias {} V outside ±{} V",
                element, bias, FLUX_OUTPUT_RANGE_V
            )));
        }
    }
    let samples = SamplingFunction::Linear { points }.samples(start, end)?;
    Ok(element_sweep(element, "bias", samples))
}

fn sweet_spot(
    element: ElementId,
    pack: &FitPack,
    key: &str,
) -> QdriveResult<Option<CalibrationUpdate>> {
    Ok(Some(CalibrationUpdate::new(
        element,
        ParameterChange::SweetSpot(pack.scalar(key)?),
    )))
}

// ============================================================================
// FluxCavity
// ============================================================================

/// Resonator response against flux bias
/// Gantree: FluxCavity // 플럭스-공진기
#[derive(Debug, Clone)]
pub struct FluxCavity {
    /// Absolute bias window per qubit (V)
    pub bias_ranges: ElementRanges,
    /// Samples per window
    pub points: usize,
    /// Averages
    pub averaging: u32,
}

impl FluxCavity {
    /// Create a sweep, 100 averages
    pub fn new(bias_ranges: ElementRanges, points: usize) -> Self {
        Self {
            bias_ranges,
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

impl Experiment for FluxCavity {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::FluxCavity
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.bias_ranges.len(), "flux cavity")?;
        require_averaging(self.averaging)?;

        let sweeps = self
            .bias_ranges
            .iter()
            .map(|(element, (start, end))| {
                bias_sweep(snapshot, *element, *start, *end, self.points)
            })
            .collect::<QdriveResult<Vec<_>>>()?;
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
        sweet_spot(element, pack, "sweet_flux")
    }
}

// ============================================================================
// FluxQubit
// ============================================================================

/// Qubit response against flux bias around the operating point
/// Gantree: FluxQubit // 플럭스-큐빗
#[derive(Debug, Clone)]
pub struct FluxQubit {
    /// Bias offsets from the current operating bias per qubit (V)
    pub offsets: ElementRanges,
    /// Samples per window
    pub points: usize,
    /// Averages
    pub averaging: u32,
}

impl FluxQubit {
    /// Create a sweep, 300 averages
    pub fn new(offsets: ElementRanges, points: usize) -> Self {
        Self {
            offsets,
            points,
            averaging: 300,
        }
    }

    /// Builder: averages
    pub fn with_averaging(mut self, averaging: u32) -> Self {
        self.averaging = averaging;
        self
    }
}

impl Experiment for FluxQubit {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::FluxQubit
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.offsets.len(), "flux qubit")?;
        require_averaging(self.averaging)?;

        let mut sweeps = Vec::with_capacity(self.offsets.len());
        for (element, (start, end)) in &self.offsets {
            let bias = snapshot.flux.proper_bias(*element)?;
            sweeps.push(bias_sweep(snapshot, *element, bias + start, bias + end, self.points)?);
        }
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
        sweet_spot(element, pack, "sweet_bias")
    }
}
