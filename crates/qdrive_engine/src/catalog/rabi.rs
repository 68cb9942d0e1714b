//! Rabi oscillations
//!
//! Gantree: L5_Engine → Catalog → Rabi
//!
//! Amplitude and duration Rabi sweeps locating the pi pulse.

use super::{
    acquisition, range_sweeps, require_averaging, require_discriminators, require_targets,
    ElementRanges,
};
use crate::config::LifecycleConfig;
use crate::experiment::{element_sweep, CommitPolicy, Experiment, SweepPlan};
use crate::sampling::{snap_time, SamplingFunction};
use crate::update::{CalibrationUpdate, ParameterChange};
use qdrive_analysis::FitPack;
use qdrive_calibration::CalibrationSnapshot;
use qdrive_core::{ElementId, ExperimentTag, QdriveError, QdriveResult};

/// Largest amplitude the drive output accepts
const MAX_DRIVE_AMP: f64 = 1.0;

// ============================================================================
// PowerRabi
// ============================================================================

/// Pi-pulse amplitude sweep at fixed duration
/// Gantree: PowerRabi // 진폭 라비
#[derive(Debug, Clone)]
pub struct PowerRabi {
    /// Amplitude window per qubit
    pub amp_ranges: ElementRanges,
    /// Grid generator
    pub sampling: SamplingFunction,
    /// Averages, or shots per point under per-shot acquisition
    pub averaging: u32,
    /// Per-shot acquisition read through the discriminator
    pub per_shot: bool,
}

impl PowerRabi {
    /// Create with 100 averages
    pub fn new(amp_ranges: ElementRanges, sampling: SamplingFunction) -> Self {
        Self {
            amp_ranges,
            sampling,
            averaging: 100,
            per_shot: false,
        }
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
}

impl Experiment for PowerRabi {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::PowerRabi
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.amp_ranges.len(), "power Rabi")?;
        require_averaging(self.averaging)?;
        for (element, (start, end)) in &self.amp_ranges {
            if start.abs() > MAX_DRIVE_AMP || end.abs() > MAX_DRIVE_AMP {
                return Err(QdriveError::ParameterValidation(format!(
                    "{} amplitude window [{}, {}] exceeds {}",
                    element, start, end, MAX_DRIVE_AMP
                )));
            }
        }

        let mut plan = SweepPlan::new(
            range_sweeps(&self.amp_ranges, self.sampling, "pi_amp")?,
            self.averaging,
        )
        .with_acquisition(acquisition(self.per_shot));
        for element in plan.targets() {
            let duration = snapshot.notebook.note(element)?.pi_duration;
            plan = plan.with_constant(element, "pi_duration", duration);
        }
        if self.per_shot {
            require_discriminators(snapshot, &plan.targets())?;
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
        let amp = pack.scalar("pi_amp")?;
        if amp.abs() > MAX_DRIVE_AMP {
            log::warn!("{} pi amplitude {} out of range", element, amp);
            return Ok(None);
        }
        Ok(Some(CalibrationUpdate::new(element, ParameterChange::PiAmp(amp))))
    }
}

// ============================================================================
// TimeRabi
// ============================================================================

/// Pi-pulse duration sweep at fixed amplitude
/// Gantree: TimeRabi // 시간 라비
#[derive(Debug, Clone)]
pub struct TimeRabi {
    /// Duration window per qubit (s)
    pub duration_ranges: ElementRanges,
    /// Grid generator
    pub sampling: SamplingFunction,
    /// Averages, or shots per point under per-shot acquisition
    pub averaging: u32,
    /// Per-shot acquisition read through the discriminator
    pub per_shot: bool,
}

impl TimeRabi {
    /// Create with 100 averages
    pub fn new(duration_ranges: ElementRanges, sampling: SamplingFunction) -> Self {
        Self {
            duration_ranges,
            sampling,
            averaging: 100,
            per_shot: false,
        }
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
}

impl Experiment for TimeRabi {
    fn tag(&self) -> ExperimentTag {
        ExperimentTag::TimeRabi
    }

    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        _config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan> {
        require_targets(self.duration_ranges.len(), "time Rabi")?;
        require_averaging(self.averaging)?;

        let mut plan = SweepPlan::new(Vec::new(), self.averaging)
            .with_acquisition(acquisition(self.per_shot));
        for (element, (start, end)) in &self.duration_ranges {
            if *start < 0.0 {
                return Err(QdriveError::ParameterValidation(format!(
                    "{} pulse duration cannot be negative, got {}",
                    element, start
                )));
            }
            let grid = self.sampling.time_samples(*start, *end)?;
            plan.sweeps.push(element_sweep(*element, "pi_duration", grid));
            let amp = snapshot.notebook.note(*element)?.pi_amp;
            plan = plan.with_constant(*element, "pi_amp", amp);
        }
        if self.per_shot {
            require_discriminators(snapshot, &plan.targets())?;
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
        let duration = snap_time(pack.scalar("pi_duration")?);
        if duration <= 0.0 {
            log::warn!("{} pi duration rounds to zero", element);
            return Ok(None);
        }
        Ok(Some(CalibrationUpdate::new(
            element,
            ParameterChange::PiDuration(duration),
        )))
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
    fn test_power_rabi_plan() {
        let ranges = ElementRanges::from([
            (ElementId::Qubit(0), (-0.6, 0.6)),
            (ElementId::Qubit(1), (0.0, 0.3)),
        ]);
        let exp = PowerRabi::new(ranges, SamplingFunction::Linear { points: 61 });
        let plan = exp.derive_parameters(&fixture::snapshot(), &config()).unwrap();

        assert_eq!(plan.targets(), vec![ElementId::Qubit(0), ElementId::Qubit(1)]);
        assert_eq!(plan.sweep(ElementId::Qubit(0)).unwrap().samples.len(), 61);
        assert_eq!(plan.constants["q1.pi_duration"], 40e-9);
        assert!(!plan.acquisition.is_per_shot());
    }

    #[test]
    fn test_power_rabi_amplitude_guard() {
        let ranges = ElementRanges::from([(ElementId::Qubit(0), (0.0, 1.2))]);
        let err = PowerRabi::new(ranges, SamplingFunction::default())
            .derive_parameters(&fixture::snapshot(), &config())
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_single_shot_needs_discriminator() {
        let ranges = ElementRanges::from([(ElementId::Qubit(0), (0.0, 0.3))]);
        let exp = PowerRabi::new(ranges, SamplingFunction::default()).with_single_shot(true);
        assert!(exp.derive_parameters(&fixture::snapshot(), &config()).is_err());
    }

    #[test]
    fn test_time_rabi_grid_in_ns() {
        let ranges = ElementRanges::from([(ElementId::Qubit(0), (0.0, 200e-9))]);
        let exp = TimeRabi::new(ranges, SamplingFunction::Linear { points: 51 });
        let plan = exp.derive_parameters(&fixture::snapshot(), &config()).unwrap();

        let grid = &plan.sweep(ElementId::Qubit(0)).unwrap().samples;
        assert_eq!(grid.len(), 51);
        approx::assert_relative_eq!(grid[1], 4e-9, epsilon = 1e-15);
        assert_eq!(plan.constants["q0.pi_amp"], 0.05);

        let pack = FitPack::new().with_scalar("pi_duration", 41.7e-9);
        let update = exp
            .propose_update(ElementId::Qubit(0), &pack, &fixture::snapshot(), &plan)
            .unwrap()
            .unwrap();
        match update.change {
            ParameterChange::PiDuration(d) => approx::assert_relative_eq!(d, 42e-9, epsilon = 1e-15),
            other => panic!("unexpected change {:?}", other),
        }
    }
}
