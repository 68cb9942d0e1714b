//! Experiment capability set
//!
//! Gantree: L5_Engine → Experiment
//!
//! An experiment is a small strategy over a fixed capability set: derive the
//! sweep plan, push hardware settings, measure, close, and turn fit packs
//! into calibration updates. The lifecycle runner owns everything else.

use crate::config::LifecycleConfig;
use crate::update::CalibrationUpdate;
use qdrive_analysis::FitPack;
use qdrive_backend::{ChannelBinding, Dataset, ElementSweep, LinkSession, SweepSpec};
use qdrive_calibration::CalibrationSnapshot;
use qdrive_core::{
    AcquisitionMode, ElementId, ExperimentTag, PortKind, QdriveError, QdriveResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// SweepPlan
// ============================================================================

/// Derived, validated parameters of one run
/// Gantree: SweepPlan // 스윕 계획
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    /// Per-element sweeps
    pub sweeps: Vec<ElementSweep>,
    /// Averages, or shots under per-shot acquisition
    pub averaging: u32,
    /// Acquisition mode
    pub acquisition: AcquisitionMode,
    /// Prepared-state traces per sample
    pub states: usize,
    /// Fixed pulse constants keyed "{element}.{name}"
    pub constants: BTreeMap<String, f64>,
}

impl SweepPlan {
    /// Averaged single-state plan
    pub fn new(sweeps: Vec<ElementSweep>, averaging: u32) -> Self {
        Self {
            sweeps,
            averaging,
            acquisition: AcquisitionMode::Averaged,
            states: 1,
            constants: BTreeMap::new(),
        }
    }

    /// Builder: acquisition mode
    pub fn with_acquisition(mut self, acquisition: AcquisitionMode) -> Self {
        self.acquisition = acquisition;
        self
    }

    /// Builder: prepared states
    pub fn with_states(mut self, states: usize) -> Self {
        self.states = states;
        self
    }

    /// Builder: pulse constant
    pub fn with_constant(mut self, element: ElementId, name: &str, value: f64) -> Self {
        self.constants.insert(format!("{}.{}", element, name), value);
        self
    }

    /// Swept elements in sweep order
    pub fn targets(&self) -> Vec<ElementId> {
        self.sweeps.iter().map(|s| s.element).collect()
    }

    /// Sweep of an element
    pub fn sweep(&self, element: ElementId) -> Option<&ElementSweep> {
        self.sweeps.iter().find(|s| s.element == element)
    }

    /// Largest sample of an element's sweep
    pub fn max_sample(&self, element: ElementId) -> Option<f64> {
        self.sweep(element)?
            .samples
            .iter()
            .copied()
            .reduce(f64::max)
    }

    /// Instrument-facing spec
    pub fn to_spec(
        &self,
        tag: ExperimentTag,
        bindings: &BTreeMap<ElementId, ChannelBinding>,
    ) -> SweepSpec {
        SweepSpec {
            tag,
            sweeps: self.sweeps.clone(),
            bindings: bindings.clone(),
            averaging: self.averaging,
            acquisition: self.acquisition,
            states: self.states,
            constants: self.constants.clone(),
        }
    }
}

/// Build one element sweep
pub fn element_sweep(element: ElementId, variable: &str, samples: Vec<f64>) -> ElementSweep {
    ElementSweep {
        element,
        variable: variable.to_string(),
        samples,
    }
}

// ============================================================================
// Commit Policy
// ============================================================================

/// How proposed updates reach the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitPolicy {
    /// The confirmation port decides
    Confirm,
    /// Committed when the experiment's quality predicate accepted the value
    QualityGated,
}

// ============================================================================
// Experiment
// ============================================================================

/// Capability set of a concrete experiment
/// Gantree: Experiment // 실험 trait
pub trait Experiment {
    /// Experiment kind
    fn tag(&self) -> ExperimentTag;

    /// Validate the request and derive the sweep plan; must not touch hardware
    fn derive_parameters(
        &self,
        snapshot: &CalibrationSnapshot,
        config: &LifecycleConfig,
    ) -> QdriveResult<SweepPlan>;

    /// Whether the drive line is part of the measurement
    fn uses_drive(&self) -> bool {
        true
    }

    /// Push bias, LO and attenuation settings for the plan
    fn prepare(
        &self,
        session: &mut LinkSession<'_>,
        snapshot: &CalibrationSnapshot,
        plan: &SweepPlan,
        bindings: &BTreeMap<ElementId, ChannelBinding>,
    ) -> QdriveResult<()> {
        push_settings(session, snapshot, plan, bindings)
    }

    /// Execute the sweep
    fn measure(
        &self,
        session: &mut LinkSession<'_>,
        plan: &SweepPlan,
        bindings: &BTreeMap<ElementId, ChannelBinding>,
    ) -> QdriveResult<Dataset> {
        session.run_sweep(&plan.to_spec(self.tag(), bindings))
    }

    /// Release the hardware: reset and zero every output
    fn close(&self, session: &mut LinkSession<'_>) -> QdriveResult<()> {
        session.reset_and_zero()
    }

    /// How updates are committed
    fn commit_policy(&self) -> CommitPolicy;

    /// Calibration update implied by one element's fit pack, if any
    fn propose_update(
        &self,
        element: ElementId,
        pack: &FitPack,
        snapshot: &CalibrationSnapshot,
        plan: &SweepPlan,
    ) -> QdriveResult<Option<CalibrationUpdate>>;
}

// ============================================================================
// Hardware Preparation Helpers
// ============================================================================

/// Resolve the physical channels of every swept element
/// Gantree: resolve_bindings(snapshot,plan,drive) -> bindings // 채널 해석
///
/// Readout is always required, drive only when the experiment uses it, flux
/// when the topology declares one.
pub fn resolve_bindings(
    snapshot: &CalibrationSnapshot,
    plan: &SweepPlan,
    uses_drive: bool,
) -> QdriveResult<BTreeMap<ElementId, ChannelBinding>> {
    let topology = &snapshot.topology;
    let mut bindings = BTreeMap::new();
    for element in plan.targets() {
        if !element.is_qubit() {
            return Err(QdriveError::ParameterValidation(format!(
                "{} is not a qubit and cannot be measured",
                element
            )));
        }
        let readout = topology
            .resolve_port(&element.port(PortKind::Readout))
            .map_err(as_resolution_error)?
            .channel_address();
        let drive = if uses_drive {
            Some(
                topology
                    .resolve_port(&element.port(PortKind::Drive))
                    .map_err(as_resolution_error)?
                    .channel_address(),
            )
        } else {
            None
        };
        let flux = topology.flux_channel(element)?;
        bindings.insert(element, ChannelBinding { readout, drive, flux });
    }
    Ok(bindings)
}

fn as_resolution_error(e: QdriveError) -> QdriveError {
    match e {
        QdriveError::NotFound { .. } => QdriveError::TopologyResolution(e.to_string()),
        other => other,
    }
}

/// Default hardware push
/// Gantree: push_settings() // 바이어스, LO, 감쇠 설정
///
/// Coupler idle biases first, then per target: operating bias, drive LO and
/// output attenuations from the notebook.
pub fn push_settings(
    session: &mut LinkSession<'_>,
    snapshot: &CalibrationSnapshot,
    plan: &SweepPlan,
    bindings: &BTreeMap<ElementId, ChannelBinding>,
) -> QdriveResult<()> {
    for (coupler, volts) in snapshot.flux.coupler_biases() {
        if let Some(channel) = snapshot.topology.flux_channel(coupler)? {
            session.set_bias(&channel, volts)?;
        }
    }

    for element in plan.targets() {
        let binding = bindings.get(&element).ok_or_else(|| {
            QdriveError::ParameterValidation(format!("{} has no channel binding", element))
        })?;
        let note = snapshot.notebook.note(element)?;

        if let Some(flux) = &binding.flux {
            session.set_bias(flux, snapshot.flux.proper_bias(element)?)?;
        }
        if let Some(drive) = &binding.drive {
            session.set_lo_frequency(drive, note.drive_lo())?;
            session.set_attenuation(drive, note.drive_atte)?;
        }
        session.set_attenuation(&binding.readout, note.readout_atte)?;
        log::debug!("{} settings pushed", element);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
