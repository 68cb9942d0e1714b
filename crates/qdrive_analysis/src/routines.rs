//! Per-experiment analysis routines
//!
//! Gantree: L4_Analysis → Routines
//!
//! Each routine turns one element's raw variable into a fit pack. Reduction
//! and outlier rejection happen here; curve fitting goes through the
//! injected `FitEngine`.

use crate::fit::{FitEngine, FitInput, FitModel, FitRecord};
use crate::fit_pack::FitPack;
use crate::outlier::OutlierFilter;
use crate::reduce::{mean_point, reduce_iq, rotate, rotation_onto_inphase};
use qdrive_backend::{DataVariable, DatasetMetadata};
use qdrive_calibration::DiscriminatorModel;
use qdrive_core::analysis::MIN_FIT_POINTS;
use qdrive_core::{ElementId, ExperimentTag, IqPoint, IqReference, QdriveError, QdriveResult};
use std::f64::consts::PI;

/// Everything a routine may consult besides the raw data
/// Gantree: AnalysisContext // 분석 문맥
pub struct AnalysisContext<'a> {
    /// Experiment kind
    pub tag: ExperimentTag,
    /// Analyzed element
    pub element: ElementId,
    /// IQ reduction reference from the calibration snapshot
    pub reference: IqReference,
    /// Curve fitter
    pub fit: &'a dyn FitEngine,
    /// Outlier filter applied before fitting
    pub filter: &'a OutlierFilter,
    /// Dataset metadata
    pub metadata: &'a DatasetMetadata,
    /// Trained readout discriminator of the element, if any
    pub discriminator: Option<&'a DiscriminatorModel>,
}

/// Analyze function signature
pub type AnalyzeFn = fn(&DataVariable, &[f64], &AnalysisContext<'_>) -> QdriveResult<FitPack>;

// ============================================================================
// Helpers
// ============================================================================

fn convergence(model: FitModel, reason: impl Into<String>) -> QdriveError {
    QdriveError::FitConvergence {
        model: model.to_string(),
        reason: reason.into(),
    }
}

fn require_states(var: &DataVariable, states: usize, tag: ExperimentTag) -> QdriveResult<()> {
    if var.states() < states {
        return Err(QdriveError::DatasetError(format!(
            "{} needs {} prepared states, dataset has {}",
            tag,
            states,
            var.states()
        )));
    }
    Ok(())
}

/// One value per sample: excited population for per-shot data, reduced IQ otherwise
fn reduced(var: &DataVariable, state: usize, ctx: &AnalysisContext<'_>) -> QdriveResult<Vec<f64>> {
    if var.is_per_shot() {
        let model = ctx.discriminator.ok_or_else(|| {
            QdriveError::ParameterValidation(format!(
                "{} per-shot data needs a trained discriminator",
                ctx.element
            ))
        })?;
        return (0..var.points())
            .map(|p| Ok(model.excited_population(&var.shots(state, p)?)))
            .collect();
    }
    let (i, q) = var.trace(state)?;
    reduce_iq(&i, &q, &ctx.reference)
}

fn span(axis: &[f64]) -> (f64, f64) {
    let lo = axis.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = axis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lo, hi)
}

/// Filter outliers, then fit; the pack gets the data and the fitted curve
fn fit_filtered(
    ctx: &AnalysisContext<'_>,
    x: &[f64],
    y: &[f64],
    model: FitModel,
    pack: &mut FitPack,
    suffix: &str,
) -> QdriveResult<FitRecord> {
    let (fx, fy) = ctx.filter.apply(x, y);
    if fx.len() < MIN_FIT_POINTS {
        return Err(convergence(
            model,
            format!("{} usable points, need {}", fx.len(), MIN_FIT_POINTS),
        ));
    }
    let record = ctx.fit.fit(&FitInput::new(fx, fy)?, model)?;
    pack.insert_array(&format!("data{}", suffix), y.to_vec());
    pack.insert_array(&format!("fit{}", suffix), record.curve(x)?);
    Ok(record)
}

fn positive(record: &FitRecord, name: &str) -> QdriveResult<f64> {
    let v = record.param(name)?;
    if v <= 0.0 {
        return Err(convergence(record.model, format!("{} = {} is not positive", name, v)));
    }
    Ok(v)
}

fn within_axis(value: f64, axis: &[f64], model: FitModel, what: &str) -> QdriveResult<f64> {
    let (lo, hi) = span(axis);
    if value < lo || value > hi {
        return Err(convergence(
            model,
            format!("{} {} outside swept range [{}, {}]", what, value, lo, hi),
        ));
    }
    Ok(value)
}

fn all_shots(var: &DataVariable, state: usize) -> QdriveResult<Vec<IqPoint>> {
    if var.is_per_shot() {
        let mut shots = Vec::new();
        for p in 0..var.points() {
            shots.extend(var.shots(state, p)?);
        }
        Ok(shots)
    } else {
        let (i, q) = var.trace(state)?;
        Ok(i.into_iter().zip(q).map(|(i, q)| IqPoint::new(i, q)).collect())
    }
}

// ============================================================================
// Spectroscopy
// ============================================================================

/// Resonator search: Lorentzian on the transmitted amplitude
pub fn analyze_cavity_search(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    let (i, q) = var.trace(0)?;
    let amplitude: Vec<f64> = i.iter().zip(&q).map(|(i, q)| i.hypot(*q)).collect();
    let mut pack = FitPack::new();
    let rec = fit_filtered(ctx, axis, &amplitude, FitModel::Lorentzian, &mut pack, "")?;
    let center = within_axis(rec.param("center")?, axis, rec.model, "resonance")?;
    pack.insert_scalar("resonance", center);
    pack.insert_scalar("width", rec.param("width")?.abs());
    Ok(pack)
}

/// Two-tone spectroscopy: qubit transition as a Lorentzian in the drive response
pub fn analyze_two_tone(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    let y = reduced(var, 0, ctx)?;
    let mut pack = FitPack::new();
    let rec = fit_filtered(ctx, axis, &y, FitModel::Lorentzian, &mut pack, "")?;
    let center = within_axis(rec.param("center")?, axis, rec.model, "qubit frequency")?;
    pack.insert_scalar("qubit_freq", center);
    pack.insert_scalar("width", rec.param("width")?.abs());
    Ok(pack)
}

/// Ground-state reference: mean IQ point
pub fn analyze_iq_reference(
    var: &DataVariable,
    _axis: &[f64],
    _ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    let shots = all_shots(var, 0)?;
    let center = mean_point(&shots)
        .ok_or_else(|| QdriveError::DatasetError("no shots for IQ reference".to_string()))?;
    let mut pack = FitPack::new()
        .with_scalar("ref_i", center.i)
        .with_scalar("ref_q", center.q);
    pack.insert_array("i", shots.iter().map(|p| p.i).collect());
    pack.insert_array("q", shots.iter().map(|p| p.q).collect());
    Ok(pack)
}

// ============================================================================
// Rabi
// ============================================================================

fn rabi(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
    name: &str,
) -> QdriveResult<FitPack> {
    let y = reduced(var, 0, ctx)?;
    let mut pack = FitPack::new();
    let rec = fit_filtered(ctx, axis, &y, FitModel::Cosine, &mut pack, "")?;
    let freq = rec.param("freq")?.abs();
    if freq == 0.0 {
        return Err(convergence(rec.model, "zero Rabi frequency"));
    }
    // Half a Rabi period from the undriven point
    let pi_point = within_axis(0.5 / freq, axis, rec.model, name)?;
    pack.insert_scalar(name, pi_point);
    pack.insert_scalar("rabi_freq", freq);
    Ok(pack)
}

/// Amplitude Rabi: pi amplitude
pub fn analyze_power_rabi(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    rabi(var, axis, ctx, "pi_amp")
}

/// Duration Rabi: pi duration
pub fn analyze_time_rabi(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    rabi(var, axis, ctx, "pi_duration")
}

// ============================================================================
// Coherence
// ============================================================================

/// Ramsey: detuning and T2*
pub fn analyze_ramsey(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    let y = reduced(var, 0, ctx)?;
    let mut pack = FitPack::new();
    let rec = fit_filtered(ctx, axis, &y, FitModel::DampedCosine, &mut pack, "")?;
    pack.insert_scalar("t2_star", positive(&rec, "tau")?);
    pack.insert_scalar("detuning", rec.param("freq")?.abs());
    Ok(pack)
}

fn decay(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
    name: &str,
) -> QdriveResult<FitPack> {
    let y = reduced(var, 0, ctx)?;
    let mut pack = FitPack::new();
    let rec = fit_filtered(ctx, axis, &y, FitModel::ExponentialDecay, &mut pack, "")?;
    pack.insert_scalar(name, positive(&rec, "tau")?);
    Ok(pack)
}

/// Spin echo: T2 echo
pub fn analyze_spin_echo(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    decay(var, axis, ctx, "t2_echo")
}

/// CPMG echo train: T2 echo from the refocused decay
pub fn analyze_cpmg(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    decay(var, axis, ctx, "t2_echo")
}

/// Energy relaxation: T1
pub fn analyze_energy_relaxation(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    decay(var, axis, ctx, "t1")
}

// ============================================================================
// Flux
// ============================================================================

/// Flux cavity: bias of the resonator dip on the flux-periodic transmission
///
/// The readout sits on the dressed cavity, so transmission is lowest where the
/// resonator frequency turns over. The minimum closest to the sweep center wins.
pub fn analyze_flux_cavity(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    let (i, q) = var.trace(0)?;
    let amplitude: Vec<f64> = i.iter().zip(&q).map(|(i, q)| i.hypot(*q)).collect();
    let mut pack = FitPack::new();
    let rec = fit_filtered(ctx, axis, &amplitude, FitModel::Cosine, &mut pack, "")?;

    let (lo, hi) = span(axis);
    let center = (lo + hi) / 2.0;
    let sweet = cosine_minima(&rec, lo, hi)?
        .into_iter()
        .min_by(|a, b| (a - center).abs().total_cmp(&(b - center).abs()))
        .ok_or_else(|| convergence(rec.model, "no transmission dip inside the swept bias"))?;
    pack.insert_scalar("sweet_flux", sweet);
    pack.insert_scalar("period", 1.0 / rec.param("freq")?.abs());
    Ok(pack)
}

/// Flux qubit: parabola vertex of the drive response against bias
pub fn analyze_flux_qubit(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    let y = reduced(var, 0, ctx)?;
    let mut pack = FitPack::new();
    let rec = fit_filtered(ctx, axis, &y, FitModel::Parabola, &mut pack, "")?;
    let curvature = rec.param("curvature")?;
    if curvature == 0.0 {
        return Err(convergence(rec.model, "flat response has no vertex"));
    }
    let vertex = -rec.param("slope")? / (2.0 * curvature);
    let sweet = within_axis(vertex, axis, rec.model, "sweet bias")?;
    pack.insert_scalar("sweet_bias", sweet);
    pack.insert_scalar("curvature", curvature);
    Ok(pack)
}

// ============================================================================
// Readout
// ============================================================================

/// Single shot: discriminator centers, rotation angle, assignment fidelity
/// Gantree: analyze_single_shot // 판별기 학습
pub fn analyze_single_shot(
    var: &DataVariable,
    _axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    if !var.is_per_shot() {
        return Err(QdriveError::DatasetError(
            "single shot analysis needs per-shot data".to_string(),
        ));
    }
    require_states(var, 2, ctx.tag)?;
    let ground_shots = all_shots(var, 0)?;
    let excited_shots = all_shots(var, 1)?;
    let (ground, excited) = match (mean_point(&ground_shots), mean_point(&excited_shots)) {
        (Some(g), Some(e)) => (g, e),
        _ => {
            return Err(QdriveError::DatasetError(
                "empty shot population".to_string(),
            ))
        }
    };
    if ground.distance(&excited) == 0.0 {
        return Err(QdriveError::FitConvergence {
            model: "discriminator".to_string(),
            reason: "ground and excited centers coincide".to_string(),
        });
    }

    let angle = rotation_onto_inphase(&ground, &excited);
    let threshold = (rotate(&ground, angle).i + rotate(&excited, angle).i) / 2.0;
    let is_excited = |p: &IqPoint| p.distance(&excited) < p.distance(&ground);
    let p00 = ground_shots.iter().filter(|p| !is_excited(p)).count() as f64
        / ground_shots.len() as f64;
    let p11 = excited_shots.iter().filter(|p| is_excited(p)).count() as f64
        / excited_shots.len() as f64;

    Ok(FitPack::new()
        .with_scalar("ground_i", ground.i)
        .with_scalar("ground_q", ground.q)
        .with_scalar("excited_i", excited.i)
        .with_scalar("excited_q", excited.q)
        .with_scalar("rotation_deg", angle)
        .with_scalar("threshold", threshold)
        .with_scalar("fidelity", (p00 + p11) / 2.0)
        .with_scalar("thermal_population", 1.0 - p00))
}

/// Readout frequency calibration: frequency of largest |e − g| separation
pub fn analyze_readout_freq_cali(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    require_states(var, 2, ctx.tag)?;
    let (ig, qg) = var.trace(0)?;
    let (ie, qe) = var.trace(1)?;
    if ig.len() != axis.len() {
        return Err(QdriveError::DatasetError(format!(
            "{} samples but axis has {}",
            ig.len(),
            axis.len()
        )));
    }
    let distance: Vec<f64> = (0..axis.len())
        .map(|k| IqPoint::new(ig[k], qg[k]).distance(&IqPoint::new(ie[k], qe[k])))
        .collect();
    let best = distance
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, _)| k)
        .ok_or_else(|| QdriveError::DatasetError("no finite IQ separation".to_string()))?;

    let mut pack = FitPack::new().with_scalar("optimal_rof", axis[best]);
    pack.insert_array("distance", distance);
    Ok(pack)
}

// ============================================================================
// Drive Calibrations
// ============================================================================

/// Drive frequency calibration: signed detuning from a Ramsey fringe
///
/// The fringe phase in the upper half turn flips the detuning sign.
pub fn analyze_drive_freq_cali(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    let y = reduced(var, 0, ctx)?;
    let mut pack = FitPack::new();
    let rec = fit_filtered(ctx, axis, &y, FitModel::Cosine, &mut pack, "")?;
    let freq = rec.param("freq")?.abs();
    let phase_deg = rec.param("phase")?.to_degrees().rem_euclid(360.0);
    let sign = if phase_deg > 180.0 { -1.0 } else { 1.0 };
    pack.insert_scalar("freq", freq);
    pack.insert_scalar("phase_deg", phase_deg);
    pack.insert_scalar("detune", sign * freq);
    Ok(pack)
}

fn cosine_minima(rec: &FitRecord, lo: f64, hi: f64) -> QdriveResult<Vec<f64>> {
    let f = rec.param("freq")?;
    let phase = rec.param("phase")?;
    if f == 0.0 {
        return Ok(Vec::new());
    }
    // Minima sit where the cosine argument hits an odd multiple of π (even for A < 0)
    let odd = if rec.param("amplitude")? >= 0.0 { 1.0 } else { 0.0 };
    Ok((-3..4)
        .map(|n| ((2.0 * n as f64 + odd) * PI - phase) / (2.0 * PI * f))
        .filter(|x| *x >= lo && *x <= hi)
        .collect())
}

/// Pi-amplitude calibration: amplitude coefficient where repeated pi pairs agree
///
/// State `k` holds the trace after a different number of pi pairs. Minima of
/// the first two traces that agree within a tenth of the span give the
/// coefficient; no agreement keeps 1.0.
pub fn analyze_pi_amp_cali(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    require_states(var, 2, ctx.tag)?;
    let (lo, hi) = span(axis);
    let tolerance = (hi - lo) / 10.0;

    let mut pack = FitPack::new();
    let first = fit_filtered(ctx, axis, &reduced(var, 0, ctx)?, FitModel::Cosine, &mut pack, "_0")?;
    let second = fit_filtered(ctx, axis, &reduced(var, 1, ctx)?, FitModel::Cosine, &mut pack, "_1")?;

    let candidates = cosine_minima(&first, lo, hi)?;
    let agreed = cosine_minima(&second, lo, hi)?
        .into_iter()
        .find(|m| candidates.iter().any(|c| (c - m).abs() <= tolerance));

    pack.insert_scalar("coef", agreed.unwrap_or(1.0));
    pack.insert_scalar("agreed", if agreed.is_some() { 1.0 } else { 0.0 });
    Ok(pack)
}

/// DRAG calibration: intersection of the linear responses of two sequences
pub fn analyze_drag_cali(
    var: &DataVariable,
    axis: &[f64],
    ctx: &AnalysisContext<'_>,
) -> QdriveResult<FitPack> {
    require_states(var, 2, ctx.tag)?;
    let mut pack = FitPack::new();
    let a = fit_filtered(ctx, axis, &reduced(var, 0, ctx)?, FitModel::Linear, &mut pack, "_0")?;
    let b = fit_filtered(ctx, axis, &reduced(var, 1, ctx)?, FitModel::Linear, &mut pack, "_1")?;

    let (a0, b0) = (a.param("slope")?, a.param("intercept")?);
    let (a1, b1) = (b.param("slope")?, b.param("intercept")?);
    let denom = a0 - a1;
    if denom.abs() <= f64::EPSILON * (a0.abs() + a1.abs()).max(1.0) {
        return Err(convergence(FitModel::Linear, "lines are parallel"));
    }
    let x = (b1 - b0) / denom;
    pack.insert_scalar("optimal_drag_coef", x);
    pack.insert_scalar("y_intersect", a0 * x + b0);
    Ok(pack)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qdrive_core::AcquisitionMode;

    /// Engine returning fixed parameters per model
    fn scripted(input: &FitInput, model: FitModel) -> QdriveResult<FitRecord> {
        Ok(match model {
            FitModel::Lorentzian => FitRecord::new(
                model,
                [("amplitude", -1.0), ("center", 6.01e9), ("width", -1e6), ("offset", 1.0)],
            ),
            FitModel::Cosine => FitRecord::new(
                model,
                [("amplitude", 1.0), ("freq", 5.0), ("phase", 0.0), ("offset", 0.0)],
            ),
            FitModel::DampedCosine => FitRecord::new(
                model,
                [("amplitude", 1.0), ("freq", -2e6), ("phase", 0.0), ("tau", 8e-6), ("offset", 0.0)],
            ),
            FitModel::ExponentialDecay => FitRecord::new(
                model,
                [("amplitude", 1.0), ("tau", 25e-6), ("offset", 0.0)],
            ),
            FitModel::Linear => {
                // slope from the first sample distinguishes the two traces
                let s = if input.y[0] > 0.5 { -1.0 } else { 1.0 };
                FitRecord::new(model, [("slope", s), ("intercept", 0.0)])
            }
            FitModel::Parabola => FitRecord::new(
                model,
                [("curvature", -2.0), ("slope", 0.4), ("intercept", 1.0)],
            ),
        })
    }

    fn meta(tag: ExperimentTag) -> DatasetMetadata {
        DatasetMetadata::new(tag, AcquisitionMode::Averaged, 100)
    }

    fn ctx<'a>(
        tag: ExperimentTag,
        reference: IqReference,
        filter: &'a OutlierFilter,
        metadata: &'a DatasetMetadata,
    ) -> AnalysisContext<'a> {
        AnalysisContext {
            tag,
            element: ElementId::Qubit(0),
            reference,
            fit: &scripted,
            filter,
            metadata,
            discriminator: None,
        }
    }

    fn flat(states: usize, n: usize) -> DataVariable {
        let traces: Vec<_> = (0..states)
            .map(|s| (vec![s as f64; n], vec![0.0; n]))
            .collect();
        DataVariable::averaged("q0_x", &traces).unwrap()
    }

    fn grid(lo: f64, hi: f64, n: usize) -> Vec<f64> {
        (0..n).map(|k| lo + (hi - lo) * k as f64 / (n - 1) as f64).collect()
    }

    #[test]
    fn test_cavity_search() {
        let m = meta(ExperimentTag::CavitySearch);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::CavitySearch, IqReference::Rotation(0.0), &f, &m);
        let axis = grid(6.0e9, 6.02e9, 11);
        let pack = analyze_cavity_search(&flat(1, 11), &axis, &c).unwrap();
        assert_eq!(pack.scalar("resonance").unwrap(), 6.01e9);
        assert_eq!(pack.scalar("width").unwrap(), 1e6);
        assert_eq!(pack.array("fit").unwrap().len(), 11);
    }

    #[test]
    fn test_cavity_resonance_outside_sweep() {
        let m = meta(ExperimentTag::CavitySearch);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::CavitySearch, IqReference::Rotation(0.0), &f, &m);
        let axis = grid(5.0e9, 5.02e9, 11);
        let err = analyze_cavity_search(&flat(1, 11), &axis, &c).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_too_few_points() {
        let m = meta(ExperimentTag::EnergyRelaxation);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::EnergyRelaxation, IqReference::Rotation(0.0), &f, &m);
        let err = analyze_energy_relaxation(&flat(1, 3), &[0.0, 1e-6, 2e-6], &c).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_power_rabi_pi_amp() {
        let m = meta(ExperimentTag::PowerRabi);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::PowerRabi, IqReference::TwoPoint(IqPoint::default()), &f, &m);
        let pack = analyze_power_rabi(&flat(1, 21), &grid(0.0, 0.2, 21), &c).unwrap();
        assert_relative_eq!(pack.scalar("pi_amp").unwrap(), 0.1);
    }

    #[test]
    fn test_coherence_routines() {
        let f = OutlierFilter::default();
        let axis = grid(0.0, 40e-6, 30);

        let m = meta(ExperimentTag::Ramsey);
        let c = ctx(ExperimentTag::Ramsey, IqReference::Rotation(10.0), &f, &m);
        let pack = analyze_ramsey(&flat(1, 30), &axis, &c).unwrap();
        assert_eq!(pack.scalar("t2_star").unwrap(), 8e-6);
        assert_eq!(pack.scalar("detuning").unwrap(), 2e6);

        let m = meta(ExperimentTag::EnergyRelaxation);
        let c = ctx(ExperimentTag::EnergyRelaxation, IqReference::Rotation(10.0), &f, &m);
        let pack = analyze_energy_relaxation(&flat(1, 30), &axis, &c).unwrap();
        assert_eq!(pack.scalar("t1").unwrap(), 25e-6);
    }

    /// [mixer, state=1, sample=5, shot=4]; sample p holds p excited shots
    fn staircase_shots() -> DataVariable {
        let (n, m) = (5, 4);
        let mut values = vec![0.0; 2 * n * m];
        for p in 0..n {
            for k in 0..m.min(p) {
                values[p * m + k] = 1.0;
            }
        }
        DataVariable::new(
            vec!["mixer".into(), "state".into(), "q0_x".into(), "shot".into()],
            vec![2, 1, n, m],
            values,
        )
        .unwrap()
    }

    fn discriminator() -> DiscriminatorModel {
        DiscriminatorModel {
            ground: IqPoint::new(0.0, 0.0),
            excited: IqPoint::new(1.0, 0.0),
            rotation_deg: 0.0,
            threshold: 0.5,
            fidelity: 0.95,
            trained_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_per_shot_reads_populations() {
        let model = discriminator();
        let f = OutlierFilter::disabled();
        let m = DatasetMetadata::new(ExperimentTag::EnergyRelaxation, AcquisitionMode::SingleShot, 4);
        let mut c = ctx(ExperimentTag::EnergyRelaxation, IqReference::Rotation(0.0), &f, &m);
        c.discriminator = Some(&model);

        let populations = [0.0, 0.25, 0.5, 0.75, 1.0];
        let pack = analyze_energy_relaxation(&staircase_shots(), &grid(0.0, 40e-6, 5), &c).unwrap();
        assert_eq!(pack.array("data").unwrap(), &populations);
        assert_eq!(pack.scalar("t1").unwrap(), 25e-6);

        let m = DatasetMetadata::new(ExperimentTag::PowerRabi, AcquisitionMode::SingleShot, 4);
        let mut c = ctx(ExperimentTag::PowerRabi, IqReference::Rotation(0.0), &f, &m);
        c.discriminator = Some(&model);
        let pack = analyze_power_rabi(&staircase_shots(), &grid(0.0, 0.2, 5), &c).unwrap();
        assert_eq!(pack.array("data").unwrap(), &populations);
        assert_relative_eq!(pack.scalar("pi_amp").unwrap(), 0.1);
    }

    #[test]
    fn test_per_shot_without_discriminator() {
        let f = OutlierFilter::disabled();
        let m = DatasetMetadata::new(ExperimentTag::EnergyRelaxation, AcquisitionMode::SingleShot, 4);
        let c = ctx(ExperimentTag::EnergyRelaxation, IqReference::Rotation(0.0), &f, &m);
        let err = analyze_energy_relaxation(&staircase_shots(), &grid(0.0, 40e-6, 5), &c)
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_two_tone() {
        let m = meta(ExperimentTag::TwoTone);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::TwoTone, IqReference::TwoPoint(IqPoint::default()), &f, &m);
        // scripted Lorentzian sits at 6.01 GHz
        let pack = analyze_two_tone(&flat(1, 11), &grid(6.0e9, 6.02e9, 11), &c).unwrap();
        assert_eq!(pack.scalar("qubit_freq").unwrap(), 6.01e9);
        assert!(analyze_two_tone(&flat(1, 11), &grid(4.0e9, 4.02e9, 11), &c).is_err());
    }

    #[test]
    fn test_cpmg_records_echo() {
        let m = meta(ExperimentTag::Cpmg);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::Cpmg, IqReference::Rotation(0.0), &f, &m);
        let pack = analyze_cpmg(&flat(1, 20), &grid(0.0, 60e-6, 20), &c).unwrap();
        assert_eq!(pack.scalar("t2_echo").unwrap(), 25e-6);
    }

    #[test]
    fn test_flux_cavity_sweet_spot() {
        let m = meta(ExperimentTag::FluxCavity);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::FluxCavity, IqReference::Rotation(0.0), &f, &m);
        // f = 5 per volt, A > 0: minima at ±0.1 V, ±0.3 V; 0.1 is closest to 0.05
        let pack = analyze_flux_cavity(&flat(1, 21), &grid(-0.2, 0.3, 21), &c).unwrap();
        assert_relative_eq!(pack.scalar("sweet_flux").unwrap(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(pack.scalar("period").unwrap(), 0.2);

        // No dip inside ±0.05 V
        assert!(analyze_flux_cavity(&flat(1, 11), &grid(-0.05, 0.05, 11), &c).is_err());
    }

    #[test]
    fn test_flux_qubit_vertex() {
        let m = meta(ExperimentTag::FluxQubit);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::FluxQubit, IqReference::Rotation(0.0), &f, &m);
        // -2x² + 0.4x + 1 peaks at 0.1 V
        let pack = analyze_flux_qubit(&flat(1, 11), &grid(-0.2, 0.2, 11), &c).unwrap();
        assert_relative_eq!(pack.scalar("sweet_bias").unwrap(), 0.1, epsilon = 1e-12);
        assert!(analyze_flux_qubit(&flat(1, 11), &grid(0.3, 0.5, 11), &c).is_err());
    }

    #[test]
    fn test_iq_reference_mean() {
        let m = meta(ExperimentTag::IqReference);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::IqReference, IqReference::Rotation(0.0), &f, &m);
        let var = DataVariable::averaged("q0_x", &[(vec![1.0, 3.0], vec![-1.0, -3.0])]).unwrap();
        let pack = analyze_iq_reference(&var, &[0.0, 1.0], &c).unwrap();
        assert_eq!(pack.scalar("ref_i").unwrap(), 2.0);
        assert_eq!(pack.scalar("ref_q").unwrap(), -2.0);
    }

    #[test]
    fn test_single_shot() {
        // [mixer, state, point=1, shot=4]; ground near (0,0), excited near (0,2)
        let i = [0.0, 0.1, -0.1, 0.0, 0.0, 0.1, -0.1, 0.0];
        let q = [0.0, 0.1, -0.1, 1.2, 2.0, 2.1, 1.9, 0.8];
        let values: Vec<f64> = i.iter().chain(q.iter()).copied().collect();
        let var = DataVariable::new(
            vec!["mixer".into(), "state".into(), "q0_x".into(), "shot".into()],
            vec![2, 2, 1, 4],
            values,
        )
        .unwrap();

        let m = DatasetMetadata::new(ExperimentTag::SingleShot, AcquisitionMode::SingleShot, 4);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::SingleShot, IqReference::Rotation(0.0), &f, &m);
        let pack = analyze_single_shot(&var, &[0.0], &c).unwrap();

        assert_relative_eq!(pack.scalar("rotation_deg").unwrap(), 90.0, epsilon = 1e-9);
        assert_relative_eq!(pack.scalar("ground_q").unwrap(), 0.3, epsilon = 1e-12);
        assert_relative_eq!(pack.scalar("excited_q").unwrap(), 1.7, epsilon = 1e-12);
        // One shot of each population lands on the wrong side
        assert_relative_eq!(pack.scalar("fidelity").unwrap(), 0.75);
        assert_relative_eq!(pack.scalar("thermal_population").unwrap(), 0.25);
    }

    #[test]
    fn test_single_shot_needs_shots() {
        let m = meta(ExperimentTag::SingleShot);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::SingleShot, IqReference::Rotation(0.0), &f, &m);
        assert!(analyze_single_shot(&flat(2, 1), &[0.0], &c).is_err());
    }

    #[test]
    fn test_readout_freq_cali() {
        let g = (vec![0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0]);
        let e = (vec![1.0, 3.0, 2.0], vec![0.0, 0.0, 0.0]);
        let var = DataVariable::averaged("q0_x", &[g, e]).unwrap();
        let m = meta(ExperimentTag::ReadoutFreqCali);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::ReadoutFreqCali, IqReference::Rotation(0.0), &f, &m);
        let pack = analyze_readout_freq_cali(&var, &[5.9e9, 6.0e9, 6.1e9], &c).unwrap();
        assert_eq!(pack.scalar("optimal_rof").unwrap(), 6.0e9);
    }

    #[test]
    fn test_drive_freq_sign_from_phase() {
        let m = meta(ExperimentTag::DriveFreqCali);
        let f = OutlierFilter::default();
        let phase_engine = |_: &FitInput, model: FitModel| -> QdriveResult<FitRecord> {
            Ok(FitRecord::new(
                model,
                [("amplitude", 1.0), ("freq", 1e6), ("phase", -PI / 2.0), ("offset", 0.0)],
            ))
        };
        let c = AnalysisContext {
            tag: ExperimentTag::DriveFreqCali,
            element: ElementId::Qubit(0),
            reference: IqReference::Rotation(0.0),
            fit: &phase_engine,
            filter: &f,
            metadata: &m,
            discriminator: None,
        };
        let pack = analyze_drive_freq_cali(&flat(1, 10), &grid(0.0, 1e-6, 10), &c).unwrap();
        assert_relative_eq!(pack.scalar("phase_deg").unwrap(), 270.0, epsilon = 1e-9);
        assert_eq!(pack.scalar("detune").unwrap(), -1e6);
    }

    #[test]
    fn test_pi_amp_cali_agreement() {
        let m = meta(ExperimentTag::PiAmpCali);
        let f = OutlierFilter::default();
        // f = 5, phase = 0, A > 0: minima at x = (2n+1)/10 -> 0.1, 0.3, ...
        let c = ctx(ExperimentTag::PiAmpCali, IqReference::Rotation(0.0), &f, &m);
        let pack = analyze_pi_amp_cali(&flat(2, 11), &grid(0.05, 0.15, 11), &c).unwrap();
        assert_relative_eq!(pack.scalar("coef").unwrap(), 0.1, epsilon = 1e-12);
        assert_eq!(pack.scalar("agreed").unwrap(), 1.0);
    }

    #[test]
    fn test_drag_intersection_and_parallel() {
        let m = meta(ExperimentTag::DragCali);
        let f = OutlierFilter::default();
        let c = ctx(ExperimentTag::DragCali, IqReference::Rotation(0.0), &f, &m);

        // Trace 0 reads 0 -> slope +1, trace 1 reads 1 -> slope -1; both through 0
        let pack = analyze_drag_cali(&flat(2, 8), &grid(-1.0, 1.0, 8), &c).unwrap();
        assert_relative_eq!(pack.scalar("optimal_drag_coef").unwrap(), 0.0);

        // Both traces identical -> identical slopes
        let same = DataVariable::averaged(
            "q0_x",
            &[(vec![0.0; 8], vec![0.0; 8]), (vec![0.0; 8], vec![0.0; 8])],
        )
        .unwrap();
        let err = analyze_drag_cali(&same, &grid(-1.0, 1.0, 8), &c).unwrap_err();
        assert!(err.is_recoverable());
    }
}
