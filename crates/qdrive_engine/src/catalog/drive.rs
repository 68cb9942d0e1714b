//! Drive calibration
//!
//! Gantree: L5_Engine → Catalog → Drive
//!
//! Drive frequency, pi amplitude and DRAG coefficient fine tuning. Every
//! result is committed only through the confirmation port.

use super::{require_averaging, require_targets, time_sweeps};
use crate::config::LifecycleConfig;
use crate::experiment::{element_sweep, push_settings, CommitPolicy, Experiment, SweepPlan};
use crate::sampling::SamplingFunction;
use crate::update::{CalibrationUpdate, ParameterChange};
use qdrive_analysis::FitPack;
use qdrive_backend::{ChannelBinding, LinkSession};
use qdrive_calibration::CalibrationSnapshot;
use qdrive_core::{ElementId, ExperimentTag, Hertz, QdriveError, QdriveResult, Seconds};
use std::collections::BTreeMap;

// ============================================================================
// DriveFreqCalibration
// ============================================================================

/// Ramsey fringe at a fixed window; the fringe frequency is the drive error
/// Gantree: DriveFreqCalibration // 구동 주파수 보정
#[derive(Debug, Clone)]
pub struct DriveFreqCalibration {
    /// Measured qubits
    pub targets: Vec<ElementId>,
    /// Longest evolution time (s)
    pub evo_time: Seconds,
    /// Intentional drive detuning during the measurement (Hz)
    pub detuning: Hertz,
    /// Samples in the window
    pub points: usize,
    /// Averages
    pub averaging: u32,
}

impl DriveFreqCalibration {
    /// Shortest evolution time in the window
    const START_S: f64 = 40e-9;

    /// 0.5 µs window, no detuning, 100 points, 100 averages
    pub fn new<I: IntoIterator<Item = ElementId>>(targets: I) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            evo_time: 0.5e-6,
            detuning: 0.0,
            points: 100,
            averaging: 100,
        }
    }

    /// Builder: evolution window
    pub fn with_evo_time(mut self, evo_time: Seconds) -> Self {
        self.evo_time = evo_time;
        self
    }

    /// Builder: intentional detuning
    pub fn with_detuning(mut self, detuning: Hertz) -> Self {
        self.detuning = detuning;
        self
    }

    /// Builder: averages
    pub fn with_averaging(mut self, averaging: u32) -> Self {
        self.averaging = averaging;
        self
    }
}

impl Experiment for DriveFreqCalibration {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::DriveFreqCali
    }

    fn derive_parameters(
        &self,
        _snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.targets.len(), "drive frequency calibration")?;
        require_averaging(self.averaging)?;
        if !self.detuning.is_finite() {
            return Err(QdriveError::ParameterValidation(format!(
                "detuning must be finite, got {}",
                self.detuning
            )));
        }

        let sweeps = time_sweeps(
            &self.targets,
            SamplingFunction::Linear { points: self.points },
            Self::START_S,
            self.evo_time,
            "time",
        )?;
        let mut plan = SweepPlan::new(sweeps, self.averaging);
        for element in &self.targets {
            plan = plan.with_constant(*element, "detuning", self.detuning);
        }
        Ok(plan)
    }

    /// Default push, then shift the drive LO by the detuning
    fn prepare(
        &self,
        session: &mut LinkSession<'_>,
        snapshot: &CalibrationSnapshot,
        plan: &SweepPlan,
        bindings: &BTreeMap<ElementId, ChannelBinding>,
    ) -> QdriveResult<()> {
        push_settings(session, snapshot, plan, bindings)?;
        if self.detuning == 0.0 {
            return Ok(());
        }
        for (element, binding) in bindings {
            if let Some(drive) = &binding.drive {
                let lo = snapshot.notebook.note(*element)?.drive_lo() + self.detuning;
                session.set_lo_frequency(drive, lo)?;
            }
        }
        Ok(())
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::Confirm
    }

    fn propose_update(
        &self,
        element: ElementId,
        pack: &FitPack,
        snapshot: &CalibrationSnapshot,
        _plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>> {
        let measured_at = snapshot.notebook.note(element)?.drive_freq + self.detuning;
        Ok(Some(CalibrationUpdate::new(
            element,
            ParameterChange::DriveFreq(measured_at - pack.scalar("detune")?),
        )))
    }
}

// ============================================================================
// PiAmpCalibration
// ============================================================================

/// Pi-amplitude coefficient from repeated pi pairs
/// Gantree: PiAmpCalibration // 파이 진폭 보정
#[derive(Debug, Clone)]
pub struct PiAmpCalibration {
    /// Coefficient window applied to the current pi amplitude, per qubit
    pub coef_ranges: BTreeMap<ElementId, (f64, f64)>,
    /// Grid generator
    pub sampling: SamplingFunction,
    /// Pi-pair counts, one prepared trace each
    pub pair_counts: Vec<u32>,
    /// Averages
    pub averaging: u32,
}

impl PiAmpCalibration {
    /// Pairs 2 and 3, 100 averages
    pub fn new(coef_ranges: BTreeMap<ElementId, (f64, f64)>, sampling: SamplingFunction) -> Self {
        Self {
            coef_ranges,
            sampling,
            pair_counts: vec![2, 3],
            averaging: 100,
        }
    }

    /// Builder: pi-pair counts
    pub fn with_pair_counts(mut self, pair_counts: Vec<u32>) -> Self {
        self.pair_counts = pair_counts;
        self
    }

    /// Builder: averages
    pub fn with_averaging(mut self, averaging: u32) -> Self {
        self.averaging = averaging;
        self
    }
}

impl Experiment for PiAmpCalibration {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::PiAmpCali
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.coef_ranges.len(), "pi amplitude calibration")?;
        require_averaging(self.averaging)?;
        if self.pair_counts.len() < 2 || self.pair_counts.contains(&0) {
            return Err(QdriveError::ParameterValidation(format!(
                "need at least two non-zero pi-pair counts, got {:?}",
                self.pair_counts
            )));
        }

        let mut plan = SweepPlan::new(Vec::new(), self.averaging).with_states(self.pair_counts.len());
        for (element, (lo, hi)) in &self.coef_ranges {
            let pi_amp = snapshot.notebook.note(*element)?.pi_amp;
            if *lo <= 0.0 || (hi * pi_amp).abs() > 1.0 {
                return Err(QdriveError::ParameterValidation(format!(
                    "{} coefficient window [{}, {}] leaves the drive range",
                    element, lo, hi
                )));
            }
            plan.sweeps.push(element_sweep(
                *element,
                "pi_amp_coef",
                self.sampling.samples(*lo, *hi)?,
            ));
            plan = plan.with_constant(*element, "pi_amp", pi_amp);
            for (k, pairs) in self.pair_counts.iter().enumerate() {
                plan = plan.with_constant(*element, &format!("pi_pairs_{}", k), f64::from(*pairs));
            }
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
        snapshot: &CalibrationSnapshot,
        _plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>> {
        if pack.scalar("agreed")? < 0.5 {
            log::warn!("{} pi-pair minima disagree, pi amplitude kept", element);
            return Ok(None);
        }
        let pi_amp = snapshot.notebook.note(element)?.pi_amp;
        Ok(Some(CalibrationUpdate::new(
            element,
            ParameterChange::PiAmp(pi_amp * pack.scalar("coef")?),
        )))
    }
}

// ============================================================================
// DragCalibration
// ============================================================================

/// DRAG coefficient from two pulse sequences
/// Gantree: DragCalibration // DRAG 보정
#[derive(Debug, Clone)]
pub struct DragCalibration {
    /// Measured qubits
    pub targets: Vec<ElementId>,
    /// Coefficient window shared by every target
    pub coef_range: (f64, f64),
    /// Grid generator
    pub sampling: SamplingFunction,
    /// Averages
    pub averaging: u32,
}

impl DragCalibration {
    /// Create with 100 averages
    pub fn new<I: IntoIterator<Item = ElementId>>(
        targets: I,
        coef_range: (f64, f64),
        sampling: SamplingFunction,
    ) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            coef_range,
            sampling,
            averaging: 100,
        }
    }

    /// Builder: averages
    pub fn with_averaging(mut self, averaging: u32) -> Self {
        self.averaging = averaging;
        self
    }
}

impl Experiment for DragCalibration {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::DragCali
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.targets.len(), "DRAG calibration")?;
        require_averaging(self.averaging)?;

        let grid = self.sampling.samples(self.coef_range.0, self.coef_range.1)?;
        let mut plan = SweepPlan::new(
            self.targets
                .iter()
                .map(|e| element_sweep(*e, "drag_coef", grid.clone()))
                .collect(),
            self.averaging,
        )
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
        let coef = pack.scalar("optimal_drag_coef")?;
        let (lo, hi) = self.coef_range;
        if coef < lo || coef > hi {
            log::warn!("{} DRAG coefficient {} outside [{}, {}]", element, coef, lo, hi);
            return Ok(None);
        }
        Ok(Some(CalibrationUpdate::new(element, ParameterChange::DragCoef(coef))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixture;
    use crate::experiment::resolve_bindings;
    use qdrive_backend::{LinkOp, SharedLink, SimulatedLink};

    fn config() -> LifecycleConfig {
        LifecycleConfig::new("snap.json", "data")
    }

    #[test]
    fn test_drive_freq_update_removes_detuning() {
        let snap = fixture::snapshot();
        let q0 = ElementId::Qubit(0);
        let exp = DriveFreqCalibration::new([q0]).with_detuning(2e6);
        let plan = exp.derive_parameters(&snap, &config()).unwrap();

        // Fringe at +2.3 MHz: the qubit sits 0.3 MHz below the default 4 GHz
        let pack = FitPack::new().with_scalar("detune", 2.3e6);
        let update = exp.propose_update(q0, &pack, &snap, &plan).unwrap().unwrap();
        match update.change {
            ParameterChange::DriveFreq(f) => approx::assert_relative_eq!(f, 4e9 - 0.3e6),
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[test]
    fn test_detuned_prepare_shifts_lo() {
        let snap = fixture::snapshot();
        let exp = DriveFreqCalibration::new([ElementId::Qubit(0)]).with_detuning(1e6);
        let plan = exp.derive_parameters(&snap, &config()).unwrap();
        let bindings = resolve_bindings(&snap, &plan, true).unwrap();

        let link = SimulatedLink::new();
        let log = link.call_log();
        let shared = SharedLink::new(link, "192.168.1.81");
        let mut session = shared.acquire().unwrap();
        exp.prepare(&mut session, &snap, &plan, &bindings).unwrap();

        assert_eq!(log.count(LinkOp::SetLo), 2);
    }

    #[test]
    fn test_pi_amp_calibration() {
        let snap = fixture::snapshot();
        let q1 = ElementId::Qubit(1);
        let ranges = BTreeMap::from([(q1, (0.8, 1.2))]);
        let exp = PiAmpCalibration::new(ranges, SamplingFunction::Linear { points: 41 });
        let plan = exp.derive_parameters(&snap, &config()).unwrap();

        assert_eq!(plan.states, 2);
        assert_eq!(plan.constants["q1.pi_pairs_1"], 3.0);

        let agreed = FitPack::new().with_scalar("coef", 1.1).with_scalar("agreed", 1.0);
        let update = exp.propose_update(q1, &agreed, &snap, &plan).unwrap().unwrap();
        match update.change {
            ParameterChange::PiAmp(a) => approx::assert_relative_eq!(a, 0.055, epsilon = 1e-12),
            other => panic!("unexpected change {:?}", other),
        }

        let disagreed = FitPack::new().with_scalar("coef", 1.0).with_scalar("agreed", 0.0);
        assert!(exp.propose_update(q1, &disagreed, &snap, &plan).unwrap().is_none());
    }

    #[test]
    fn test_pi_amp_needs_two_traces() {
        let ranges = BTreeMap::from([(ElementId::Qubit(0), (0.8, 1.2))]);
        let exp = PiAmpCalibration::new(ranges, SamplingFunction::default()).with_pair_counts(vec![2]);
        assert!(exp.derive_parameters(&fixture::snapshot(), &config()).is_err());
    }

    #[test]
    fn test_drag_calibration() {
        let snap = fixture::snapshot();
        let exp = DragCalibration::new(
            [ElementId::Qubit(0), ElementId::Qubit(1)],
            (-2.0, 2.0),
            SamplingFunction::Linear { points: 21 },
        );
        let plan = exp.derive_parameters(&snap, &config()).unwrap();
        assert_eq!(plan.sweeps.len(), 2);
        assert_eq!(plan.states, 2);

        let inside = FitPack::new().with_scalar("optimal_drag_coef", 0.4);
        assert!(exp.propose_update(ElementId::Qubit(0), &inside, &snap, &plan).unwrap().is_some());
        let outside = FitPack::new().with_scalar("optimal_drag_coef", 3.0);
        assert!(exp.propose_update(ElementId::Qubit(0), &outside, &snap, &plan).unwrap().is_none());
    }
}
