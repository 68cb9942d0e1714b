//! Coherence characterization
//!
//! Gantree: L5_Engine → Catalog → Coherence
//!
//! T1, Ramsey T2*, spin-echo and CPMG T2 over a shared free-evolution grid.
//! Fitted constants are committed to the history when they pass the decay
//! window predicate.

use super::{
    acquisition, decay_accepted, require_averaging, require_discriminators, require_targets,
};
use crate::config::LifecycleConfig;
use crate::experiment::{element_sweep, CommitPolicy, Experiment, SweepPlan};
use crate::sampling::SamplingFunction;
use crate::update::{CalibrationUpdate, ParameterChange};
use qdrive_analysis::FitPack;
use qdrive_calibration::CalibrationSnapshot;
use qdrive_core::constants::lifecycle::TIME_RESOLUTION_S;
use qdrive_core::{ElementId, ExperimentTag, QdriveError, QdriveResult, Seconds};

/// Shortest evolution time the sequencer plays
const MIN_EVOLUTION_S: f64 = 4e-9;

/// Free-evolution sweep request shared by the coherence experiments
/// Gantree: CoherenceRequest // 결맞음 요청
#[derive(Debug, Clone)]
pub struct CoherenceRequest {
    /// Longest evolution time (s)
    pub max_evo_time: Seconds,
    /// Measured qubits
    pub targets: Vec<ElementId>,
    /// Grid generator
    pub sampling: SamplingFunction,
    /// Averages, or shots per point under per-shot acquisition
    pub averaging: u32,
    /// Per-shot acquisition read through the discriminator
    pub per_shot: bool,
}

impl CoherenceRequest {
    /// 100-point linear grid, 300 averages
    pub fn new<I: IntoIterator<Item = ElementId>>(max_evo_time: Seconds, targets: I) -> Self {
        Self {
            max_evo_time,
            targets: targets.into_iter().collect(),
            sampling: SamplingFunction::Linear { points: 100 },
            averaging: 300,
            per_shot: false,
        }
    }

    /// Builder: grid generator
    pub fn with_sampling(mut self, sampling: SamplingFunction) -> Self {
        self.sampling = sampling;
        self
    }

    /// Builder: averages
    pub fn with_averaging(mut self, averaging: u32) -> Self {
        self.averaging = averaging;
        self
    }

    /// Builder: per-shot acquisition
    pub fn with_single_shot(mut self, per_shot: bool) -> Self {
        self.per_shot = per_shot;
        self
    }

    fn plan(&self, snapshot: &CalibrationSnapshot, what: &str) -> QdriveResult<SweepPlan> {
        self.plan_spaced(snapshot, what, TIME_RESOLUTION_S)
    }

    /// Plan whose evolution times are whole multiples of `spacing`
    fn plan_spaced(
        &self,
        snapshot: &CalibrationSnapshot,
        what: &str,
        spacing: f64,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.targets.len(), what)?;
        require_averaging(self.averaging)?;
        let start = MIN_EVOLUTION_S.max(spacing);
        if !(self.max_evo_time.is_finite() && self.max_evo_time > start) {
            return Err(QdriveError::ParameterValidation(format!(
                "max evolution time must exceed {} s, got {}",
                start, self.max_evo_time
            )));
        }

        let grid = self.sampling.time_samples_on(start, self.max_evo_time, spacing)?;
        let sweeps = self
            .targets
            .iter()
            .map(|element| element_sweep(*element, "time", grid.clone()))
            .collect();
        if self.per_shot {
            require_discriminators(snapshot, &self.targets)?;
        }
        Ok(SweepPlan::new(sweeps, self.averaging).with_acquisition(acquisition(self.per_shot)))
    }
}

/// Quality-gated history update from a fitted constant
fn gated(
    element: ElementId,
    pack: &FitPack,
    plan: &SweepPlan,
    key: &str,
    change: fn(Seconds) -> ParameterChange,
) -> QdriveResult<Option<CalibrationUpdate>> {
    let value = pack.scalar(key)?;
    if !decay_accepted(value, plan, element) {
        log::warn!(
            "{} {} = {:.3e} s outside the decay window, not recorded",
            element,
            key,
            value
        );
        return Ok(None);
    }
    Ok(Some(CalibrationUpdate::new(element, change(value))))
}

// ============================================================================
// EnergyRelaxation
// ============================================================================

/// T1 decay after a pi pulse
/// Gantree: EnergyRelaxation // T1
#[derive(Debug, Clone)]
pub struct EnergyRelaxation(pub CoherenceRequest);

impl Experiment for EnergyRelaxation {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::EnergyRelaxation
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        self.0.plan(snapshot, "T1")
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::QualityGated
    }

    fn propose_update(
        &self,
        element: ElementId,
        pack: &FitPack,
        _snapshot: &CalibrationSnapshot,
        plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>> {
        gated(element, pack, plan, "t1", ParameterChange::T1)
    }
}

// ============================================================================
// Ramsey
// ============================================================================

/// Ramsey fringe between two half-pi pulses
/// Gantree: Ramsey // T2*
#[derive(Debug, Clone)]
pub struct Ramsey(pub CoherenceRequest);

impl Experiment for Ramsey {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::Ramsey
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        let mut plan = self.0.plan(snapshot, "Ramsey")?;
        for element in &self.0.targets {
            let detuning = snapshot.notebook.note(*element)?.ramsey_detuning;
            plan = plan.with_constant(*element, "detuning", detuning);
        }
        Ok(plan)
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::QualityGated
    }

    fn propose_update(
        &self,
        element: ElementId,
        pack: &FitPack,
        _snapshot: &CalibrationSnapshot,
        plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>> {
        gated(element, pack, plan, "t2_star", ParameterChange::T2Star)
    }
}

// ============================================================================
// SpinEcho
// ============================================================================

/// Hahn echo: one refocusing pi pulse at mid evolution
/// Gantree: SpinEcho // T2 echo
#[derive(Debug, Clone)]
pub struct SpinEcho(pub CoherenceRequest);

impl Experiment for SpinEcho {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::SpinEcho
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        let mut plan = self.0.plan(snapshot, "spin echo")?;
        for element in &self.0.targets {
            plan = plan.with_constant(*element, "pi_num", 1.0);
        }
        Ok(plan)
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::QualityGated
    }

    fn propose_update(
        &self,
        element: ElementId,
        pack: &FitPack,
        _snapshot: &CalibrationSnapshot,
        plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>> {
        gated(element, pack, plan, "t2_echo", ParameterChange::T2Echo)
    }
}

// ============================================================================
// Cpmg
// ============================================================================

/// Carr-Purcell-Meiboom-Gill train of `pi_num` refocusing pulses
/// Gantree: Cpmg // CPMG T2
///
/// Evolution times are whole multiples of `2 * pi_num` ns so every
/// inter-pulse gap lands on the sequencer grid.
#[derive(Debug, Clone)]
pub struct Cpmg {
    /// Shared free-evolution request
    pub request: CoherenceRequest,
    /// Refocusing pulses per evolution
    pub pi_num: u32,
}

impl Cpmg {
    /// Create a CPMG run
    pub fn new(request: CoherenceRequest, pi_num: u32) -> Self {
        Self { request, pi_num }
    }
}

impl Experiment for Cpmg {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::Cpmg
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        if self.pi_num == 0 {
            return Err(QdriveError::ParameterValidation(
                "CPMG needs at least one refocusing pulse".to_string(),
            ));
        }
        let spacing = 2.0 * self.pi_num as f64 * TIME_RESOLUTION_S;
        let mut plan = self.request.plan_spaced(snapshot, "CPMG", spacing)?;
        for element in &self.request.targets {
            plan = plan.with_constant(*element, "pi_num", self.pi_num as f64);
        }
        Ok(plan)
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::QualityGated
    }

    fn propose_update(
        &self,
        element: ElementId,
        pack: &FitPack,
        _snapshot: &CalibrationSnapshot,
        plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>> {
        gated(element, pack, plan, "t2_echo", ParameterChange::T2Echo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixture;

    fn config() -> LifecycleConfig {
        LifecycleConfig::new("snap.json", "data")
    }

    #[test]
    fn test_grid_starts_at_sequencer_minimum() {
        let exp = EnergyRelaxation(CoherenceRequest::new(100e-6, [ElementId::Qubit(0)]));
        let plan = exp.derive_parameters(&fixture::snapshot(), &config()).unwrap();
        let grid = &plan.sweep(ElementId::Qubit(0)).unwrap().samples;

        approx::assert_relative_eq!(grid[0], 4e-9, epsilon = 1e-15);
        approx::assert_relative_eq!(grid[grid.len() - 1], 100e-6, epsilon = 1e-12);
        assert_eq!(plan.averaging, 300);
    }

    #[test]
    fn test_invalid_evolution_time() {
        let exp = Ramsey(CoherenceRequest::new(2e-9, [ElementId::Qubit(0)]));
        assert!(exp.derive_parameters(&fixture::snapshot(), &config()).is_err());

        let exp = SpinEcho(CoherenceRequest::new(50e-6, Vec::new()));
        assert!(exp.derive_parameters(&fixture::snapshot(), &config()).is_err());
    }

    #[test]
    fn test_t1_quality_gate() {
        let exp = EnergyRelaxation(CoherenceRequest::new(100e-6, [ElementId::Qubit(0)]));
        let snap = fixture::snapshot();
        let plan = exp.derive_parameters(&snap, &config()).unwrap();
        let q0 = ElementId::Qubit(0);

        let good = FitPack::new().with_scalar("t1", 35e-6);
        let update = exp.propose_update(q0, &good, &snap, &plan).unwrap().unwrap();
        assert_eq!(update.change, ParameterChange::T1(35e-6));

        let runaway = FitPack::new().with_scalar("t1", 2e-3);
        assert!(exp.propose_update(q0, &runaway, &snap, &plan).unwrap().is_none());
    }

    #[test]
    fn test_ramsey_carries_detuning() {
        let exp = Ramsey(
            CoherenceRequest::new(20e-6, [ElementId::Qubit(1)])
                .with_sampling(SamplingFunction::Logarithmic { points: 50 }),
        );
        let plan = exp.derive_parameters(&fixture::snapshot(), &config()).unwrap();
        assert_eq!(plan.constants["q1.detuning"], 0.0);
        assert_eq!(exp.commit_policy(), CommitPolicy::QualityGated);
    }

    #[test]
    fn test_cpmg_grid_follows_pulse_count() {
        let q0 = ElementId::Qubit(0);
        let exp = Cpmg::new(CoherenceRequest::new(40e-6, [q0]), 4);
        let plan = exp.derive_parameters(&fixture::snapshot(), &config()).unwrap();
        let grid = &plan.sweep(q0).unwrap().samples;

        approx::assert_relative_eq!(grid[0], 8e-9, epsilon = 1e-15);
        for t in grid {
            let periods = t / 8e-9;
            approx::assert_relative_eq!(periods, periods.round(), epsilon = 1e-6);
        }
        assert_eq!(plan.constants["q0.pi_num"], 4.0);
        assert_eq!(exp.commit_policy(), CommitPolicy::QualityGated);
    }

    #[test]
    fn test_cpmg_needs_a_pulse() {
        let exp = Cpmg::new(CoherenceRequest::new(40e-6, [ElementId::Qubit(0)]), 0);
        let err = exp.derive_parameters(&fixture::snapshot(), &config()).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_cpmg_records_echo_history() {
        let q1 = ElementId::Qubit(1);
        let exp = Cpmg::new(CoherenceRequest::new(40e-6, [q1]), 2);
        let snap = fixture::snapshot();
        let plan = exp.derive_parameters(&snap, &config()).unwrap();

        let pack = FitPack::new().with_scalar("t2_echo", 22e-6);
        let update = exp.propose_update(q1, &pack, &snap, &plan).unwrap().unwrap();
        assert_eq!(update.change, ParameterChange::T2Echo(22e-6));
    }
}
