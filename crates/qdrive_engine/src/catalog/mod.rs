//! Experiment catalog
//!
//! Gantree: L5_Engine → Catalog
//!
//! Concrete experiments. Each one derives its sweep plan from per-qubit
//! requests plus the snapshot, and maps its fit packs onto calibration
//! updates; the lifecycle runner does everything else.

mod coherence;
mod drive;
mod flux;
mod rabi;
mod readout;
mod spectroscopy;

pub use coherence::{CoherenceRequest, Cpmg, EnergyRelaxation, Ramsey, SpinEcho};
pub use drive::{DragCalibration, DriveFreqCalibration, PiAmpCalibration};
pub use flux::{FluxCavity, FluxQubit};
pub use rabi::{PowerRabi, TimeRabi};
pub use readout::{ReadoutFreqCalibration, SingleShot};
pub use spectroscopy::{CavitySearch, IqReferenceExp, TwoToneSpectroscopy};

use crate::experiment::{element_sweep, SweepPlan};
use crate::sampling::SamplingFunction;
use qdrive_backend::ElementSweep;
use qdrive_calibration::CalibrationSnapshot;
use qdrive_core::constants::lifecycle::DECAY_WINDOW_FACTOR;
use qdrive_core::{AcquisitionMode, ElementId, QdriveError, QdriveResult};
use std::collections::BTreeMap;

/// Per-element `[start, end]` request
pub type ElementRanges = BTreeMap<ElementId, (f64, f64)>;

// ============================================================================
// Plan Helpers
// ============================================================================

pub(crate) fn require_targets(count: usize, what: &str) -> QdriveResult<()> {
    if count == 0 {
        return Err(QdriveError::ParameterValidation(format!(
            "no target given for {}",
            what
        )));
    }
    Ok(())
}

pub(crate) fn require_averaging(averaging: u32) -> QdriveResult<()> {
    if averaging == 0 {
        return Err(QdriveError::ParameterValidation(
            "averaging must be > 0".to_string(),
        ));
    }
    Ok(())
}

/// One sweep per requested range
pub(crate) fn range_sweeps(
    ranges: &ElementRanges,
    sampling: SamplingFunction,
    variable: &str,
) -> QdriveResult<Vec<ElementSweep>> {
    ranges
        .iter()
        .map(|(element, (start, end))| {
            Ok(element_sweep(*element, variable, sampling.samples(*start, *end)?))
        })
        .collect()
}

/// Same nanosecond time grid for every target
pub(crate) fn time_sweeps(
    targets: &[ElementId],
    sampling: SamplingFunction,
    start: f64,
    end: f64,
    variable: &str,
) -> QdriveResult<Vec<ElementSweep>> {
    let grid = sampling.time_samples(start, end)?;
    Ok(targets
        .iter()
        .map(|element| element_sweep(*element, variable, grid.clone()))
        .collect())
}

/// Frequency window around a center, bounded by the configured span
pub(crate) fn frequency_window(
    element: ElementId,
    start: f64,
    end: f64,
    max_span: f64,
) -> QdriveResult<()> {
    if end - start > max_span {
        return Err(QdriveError::ParameterValidation(format!(
            "{} frequency span {:.3} MHz exceeds {:.3} MHz",
            element,
            (end - start) * 1e-6,
            max_span * 1e-6
        )));
    }
    Ok(())
}

pub(crate) fn acquisition(per_shot: bool) -> AcquisitionMode {
    if per_shot {
        AcquisitionMode::SingleShot
    } else {
        AcquisitionMode::Averaged
    }
}

/// Per-shot sweeps are read through a trained discriminator
pub(crate) fn require_discriminators(
    snapshot: &CalibrationSnapshot,
    targets: &[ElementId],
) -> QdriveResult<()> {
    for element in targets {
        if !snapshot.discriminators.is_ready(*element) {
            return Err(QdriveError::ParameterValidation(format!(
                "{} has no trained discriminator; run single shot first",
                element
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Quality Predicate
// ============================================================================

/// Accept a fitted decay constant
/// Gantree: decay_accepted(value,plan,element) -> bool // 품질 조건
///
/// Finite, positive, and at most `DECAY_WINDOW_FACTOR` times the longest
/// sampled time of the element.
pub fn decay_accepted(value: f64, plan: &SweepPlan, element: ElementId) -> bool {
    match plan.max_sample(element) {
        Some(window) => {
            value.is_finite() && value > 0.0 && value <= DECAY_WINDOW_FACTOR * window
        }
        None => false,
    }
}

// ============================================================================
// Tests
// ============================================================================
