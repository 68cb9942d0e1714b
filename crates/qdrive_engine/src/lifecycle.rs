//! Experiment lifecycle
//!
//! Gantree: L5_Engine → ExperimentRunner
//!
//! Drives one experiment through its five stages: set parameters, prepare
//! hardware, run measurement, close measurement and run analysis. Stages are
//! strictly ordered; resource guards run before any hardware contact and
//! every prepared pass is closed exactly once.

use crate::config::LifecycleConfig;
use crate::confirm::{Approval, ConfirmationPort};
use crate::experiment::{resolve_bindings, CommitPolicy, Experiment, SweepPlan};
use crate::update::CalibrationUpdate;
use qdrive_analysis::{AnalysisDispatch, DatasetAnalysis};
use qdrive_backend::{ChannelBinding, DatasetStore, LinkSession, SharedLink};
use qdrive_calibration::{CalibrationSnapshot, SnapshotStore};
use qdrive_core::{ElementId, ExperimentTag, QdriveError, QdriveResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// Lifecycle State
// ============================================================================

/// Lifecycle stage reached
/// Gantree: LifecycleState // 단계 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Nothing derived yet
    Idle,
    /// Plan derived and guarded
    ParametersSet,
    /// Settings pushed to the hardware
    HardwarePrepared,
    /// Dataset acquired (or skipped in a dry run)
    MeasurementComplete,
    /// Hardware reset and released
    Closed,
    /// Analysis done
    Analyzed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::ParametersSet => "parameters-set",
            LifecycleState::HardwarePrepared => "hardware-prepared",
            LifecycleState::MeasurementComplete => "measurement-complete",
            LifecycleState::Closed => "closed",
            LifecycleState::Analyzed => "analyzed",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag, checked at loop boundaries
/// Gantree: CancellationToken // 취소 토큰
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of a workflow
/// Gantree: WorkFlowReport // 워크플로 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkFlowReport {
    /// Passes completed
    pub passes: usize,
    /// Persisted datasets, one per executed pass
    pub datasets: Vec<PathBuf>,
    /// Repeat count crossed the monitor threshold
    pub monitor: bool,
    /// Stopped by cancellation
    pub cancelled: bool,
}

/// Outcome of an analysis stage
/// Gantree: AnalysisReport // 분석 결과
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Experiment kind
    pub tag: ExperimentTag,
    /// Per-dataset analyses
    pub analyses: Vec<DatasetAnalysis>,
    /// Committed updates
    pub applied: Vec<CalibrationUpdate>,
    /// Proposals that were not approved
    pub rejected: Vec<CalibrationUpdate>,
    /// Snapshot written back
    pub saved: bool,
}

impl AnalysisReport {
    fn empty(tag: ExperimentTag) -> Self {
        Self {
            tag,
            analyses: Vec::new(),
            applied: Vec::new(),
            rejected: Vec::new(),
            saved: false,
        }
    }

    /// Elements whose analysis fell back to raw rendering, over all datasets
    pub fn failed_elements(&self) -> BTreeSet<ElementId> {
        self.analyses
            .iter()
            .flat_map(|a| a.failures().into_keys())
            .collect()
    }
}

// ============================================================================
// Resource Guards
// ============================================================================

/// Check a plan against the snapshot before any hardware contact
/// Gantree: check_plan(plan,snapshot) -> Result // 계획 검증
pub fn check_plan(plan: &SweepPlan, snapshot: &CalibrationSnapshot) -> QdriveResult<()> {
    if plan.sweeps.is_empty() {
        return Err(QdriveError::ParameterValidation(
            "no element to measure".to_string(),
        ));
    }
    if plan.averaging == 0 {
        return Err(QdriveError::ParameterValidation(
            "averaging must be > 0".to_string(),
        ));
    }
    if plan.states == 0 {
        return Err(QdriveError::ParameterValidation(
            "at least one prepared state is required".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for sweep in &plan.sweeps {
        snapshot.check_element(sweep.element)?;
        if !sweep.element.is_qubit() {
            return Err(QdriveError::ParameterValidation(format!(
                "{} is not a qubit and cannot be measured",
                sweep.element
            )));
        }
        if !seen.insert(sweep.element) {
            return Err(QdriveError::ParameterValidation(format!(
                "{} is swept twice",
                sweep.element
            )));
        }
        if sweep.samples.is_empty() {
            return Err(QdriveError::ParameterValidation(format!(
                "{} has an empty sweep",
                sweep.element
            )));
        }
        if sweep.samples.iter().any(|x| !x.is_finite()) {
            return Err(QdriveError::ParameterValidation(format!(
                "{} has a non-finite sample",
                sweep.element
            )));
        }
    }
    Ok(())
}

/// Per-shot acquisition buffer guard
/// Gantree: check_buffer(plan,ceiling) -> Result // 버퍼 한도
///
/// Under per-shot acquisition every element needs `samples x shots` memory
/// on the acquisition module. Averaged acquisition is not limited.
pub fn check_buffer(plan: &SweepPlan, ceiling: u64) -> QdriveResult<()> {
    if !plan.acquisition.is_per_shot() {
        return Ok(());
    }
    for sweep in &plan.sweeps {
        let requested = sweep.samples.len() as u64 * u64::from(plan.averaging);
        if requested > ceiling {
            return Err(QdriveError::ResourceLimitExceeded {
                element: sweep.element.to_string(),
                requested,
                ceiling,
            });
        }
    }
    Ok(())
}

// ============================================================================
// ExperimentRunner
// ============================================================================

/// Staged runner of one experiment
/// Gantree: ExperimentRunner // 라이프사이클 실행기
pub struct ExperimentRunner<E: Experiment> {
    experiment: E,
    config: LifecycleConfig,
    link: SharedLink,
    state: LifecycleState,
    execution: bool,
    snapshot: Option<CalibrationSnapshot>,
    plan: Option<SweepPlan>,
    bindings: BTreeMap<ElementId, ChannelBinding>,
    batch: Option<PathBuf>,
    datasets: Vec<PathBuf>,
}

impl<E: Experiment> ExperimentRunner<E> {
    /// Create a runner over a shared hardware link
    pub fn new(experiment: E, config: LifecycleConfig, link: SharedLink) -> Self {
        Self {
            experiment,
            config,
            link,
            state: LifecycleState::Idle,
            execution: true,
            snapshot: None,
            plan: None,
            bindings: BTreeMap::new(),
            batch: None,
            datasets: Vec::new(),
        }
    }

    /// Current stage
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Experiment being run
    pub fn experiment(&self) -> &E {
        &self.experiment
    }

    /// Configuration
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Derived plan
    pub fn plan(&self) -> Option<&SweepPlan> {
        self.plan.as_ref()
    }

    /// Snapshot in use; after analysis, the one with the committed updates
    pub fn snapshot(&self) -> Option<&CalibrationSnapshot> {
        self.snapshot.as_ref()
    }

    /// Datasets persisted so far
    pub fn datasets(&self) -> &[PathBuf] {
        &self.datasets
    }

    /// Whether measurements are executed or only planned
    pub fn is_execution(&self) -> bool {
        self.execution
    }

    // ========================================================================
    // Lifecycle Stages
    // ========================================================================

    /// Stage 1: load the snapshot, derive and guard the plan
    /// Gantree: set_parameters(execution) -> Result // 파라미터 설정
    ///
    /// With `execution == false` the later stages run as a dry run: nothing is
    /// measured, persisted or committed.
    pub fn set_parameters(&mut self, execution: bool) -> QdriveResult<&SweepPlan> {
        self.require(
            "set_parameters",
            &[
                LifecycleState::Idle,
                LifecycleState::ParametersSet,
                LifecycleState::Closed,
                LifecycleState::Analyzed,
            ],
        )?;
        self.config.validate().map_err(QdriveError::ConfigError)?;

        let snapshot = SnapshotStore::load(&self.config.snapshot_path)?;
        let plan = self.experiment.derive_parameters(&snapshot, &self.config)?;
        check_plan(&plan, &snapshot)?;
        check_buffer(&plan, self.config.buffer_ceiling)?;

        log::info!(
            "{}: {} element(s), {} averages, {:?}{}",
            self.experiment.tag(),
            plan.sweeps.len(),
            plan.averaging,
            plan.acquisition,
            if execution { "" } else { " (dry run)" }
        );

        self.execution = execution;
        self.snapshot = Some(snapshot);
        self.bindings.clear();
        self.batch = None;
        self.datasets.clear();
        self.state = LifecycleState::ParametersSet;
        Ok(&*self.plan.insert(plan))
    }

    /// Stage 2: resolve channels and push settings
    /// Gantree: prepare_hardware(session) -> Result // 하드웨어 준비
    ///
    /// A failed push resets the hardware before the error is returned.
    pub fn prepare_hardware(&mut self, session: &mut LinkSession<'_>) -> QdriveResult<()> {
        self.require(
            "prepare_hardware",
            &[LifecycleState::ParametersSet, LifecycleState::Closed],
        )?;
        let (snapshot, plan) = self.derived("prepare_hardware")?;
        let bindings = resolve_bindings(snapshot, plan, self.experiment.uses_drive())?;

        if let Err(e) = self.experiment.prepare(session, snapshot, plan, &bindings) {
            if let Err(reset) = session.reset_and_zero() {
                log::warn!("Reset after failed preparation also failed: {}", reset);
            }
            return Err(e);
        }

        self.bindings = bindings;
        self.state = LifecycleState::HardwarePrepared;
        Ok(())
    }

    /// Stage 3: measure and persist the raw dataset
    /// Gantree: run_measurement(session) -> Option<PathBuf> // 측정
    ///
    /// Returns the dataset path, or `None` in a dry run.
    pub fn run_measurement(&mut self, session: &mut LinkSession<'_>) -> QdriveResult<Option<PathBuf>> {
        self.require("run_measurement", &[LifecycleState::HardwarePrepared])?;

        if !self.execution {
            log::info!("{}: dry run, measurement skipped", self.experiment.tag());
            self.state = LifecycleState::MeasurementComplete;
            return Ok(None);
        }

        let (_, plan) = self.derived("run_measurement")?;
        let dataset = self.experiment.measure(session, plan, &self.bindings)?;

        let store = self.config.dataset_store();
        let folder = self.batch_folder(&store)?;
        let path = store.save(&dataset, &folder, self.config.job_id.as_deref())?;

        self.datasets.push(path.clone());
        self.state = LifecycleState::MeasurementComplete;
        Ok(Some(path))
    }

    /// Stage 4: reset and zero the hardware
    /// Gantree: close_measurement(session) -> Result // 종료
    ///
    /// Idempotent. The lifecycle counts as closed even when the reset fails.
    pub fn close_measurement(&mut self, session: &mut LinkSession<'_>) -> QdriveResult<()> {
        self.require(
            "close_measurement",
            &[
                LifecycleState::HardwarePrepared,
                LifecycleState::MeasurementComplete,
                LifecycleState::Closed,
            ],
        )?;
        let closed = self.experiment.close(session);
        self.state = LifecycleState::Closed;
        closed
    }

    /// Prepare, measure and close `repeat` times
    /// Gantree: work_flow(repeat,cancel) -> WorkFlowReport // 워크플로
    ///
    /// Above the monitor threshold the loop runs as a monitor: bounded by the
    /// configured cap, and a cancellation ends it with a normal report. Below
    /// it, cancellation is an error carrying the completed pass count.
    pub fn work_flow(
        &mut self,
        repeat: usize,
        cancel: &CancellationToken,
    ) -> QdriveResult<WorkFlowReport> {
        if repeat == 0 {
            return Err(QdriveError::ParameterValidation(
                "repeat must be > 0".to_string(),
            ));
        }
        self.require(
            "work_flow",
            &[LifecycleState::ParametersSet, LifecycleState::Closed],
        )?;

        let monitor = repeat > self.config.monitor_threshold;
        let limit = match self.config.monitor_iteration_cap {
            Some(cap) if monitor => cap.min(repeat),
            _ => repeat,
        };
        if monitor {
            log::info!("{}: monitor mode, up to {} passes", self.experiment.tag(), limit);
        }

        let mut report = WorkFlowReport {
            passes: 0,
            datasets: Vec::new(),
            monitor,
            cancelled: false,
        };
        while report.passes < limit {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if let Some(path) = self.run_pass()? {
                report.datasets.push(path);
            }
            report.passes += 1;
            log::debug!("{}: pass {}/{} done", self.experiment.tag(), report.passes, limit);
        }

        if report.cancelled {
            log::info!(
                "{}: cancelled after {} pass(es)",
                self.experiment.tag(),
                report.passes
            );
            if !monitor {
                return Err(QdriveError::Cancelled {
                    completed: report.passes,
                });
            }
        }
        Ok(report)
    }

    /// Stage 5: analyze every dataset and commit approved updates
    /// Gantree: run_analysis(dispatch,confirm) -> AnalysisReport // 분석
    ///
    /// Samples are screened with the configured outlier filter. Element
    /// failures are isolated. Nothing reaches the snapshot file unless
    /// updates were approved and `keep_snapshot` is set.
    pub fn run_analysis(
        &mut self,
        dispatch: &AnalysisDispatch,
        confirm: &dyn ConfirmationPort,
    ) -> QdriveResult<AnalysisReport> {
        self.require("run_analysis", &[LifecycleState::Closed])?;
        let tag = self.experiment.tag();

        if !self.execution {
            self.state = LifecycleState::Analyzed;
            return Ok(AnalysisReport::empty(tag));
        }

        let (_, plan) = self.derived("run_analysis")?;
        // Other lifecycles may have committed since this one started
        let mut snapshot = SnapshotStore::load(&self.config.snapshot_path)?;
        let mut report = AnalysisReport::empty(tag);
        let mut proposals = Vec::new();
        let filter = self.config.outlier_filter();

        for path in &self.datasets {
            let dataset = DatasetStore::load(path)?;
            let artifacts = if self.config.save_artifacts {
                Some(artifact_folder(path)?)
            } else {
                None
            };
            let analysis =
                dispatch.analyze_dataset_with(&dataset, &snapshot, &filter, artifacts.as_deref())?;

            for (element, pack) in analysis.fitted() {
                match self.experiment.propose_update(element, pack, &snapshot, plan) {
                    Ok(Some(update)) => proposals.push(update),
                    Ok(None) => log::info!("{} {}: no update proposed", tag, element),
                    Err(e) => log::warn!("{} {}: update rejected: {}", tag, element, e),
                }
            }
            report.analyses.push(analysis);
        }

        let approval = if proposals.is_empty() {
            Approval::None
        } else if self.config.require_confirmation
            || self.experiment.commit_policy() == CommitPolicy::Confirm
        {
            confirm.confirm(tag, &proposals)
        } else {
            Approval::All
        };

        for update in proposals {
            if approval.approves(update.element) {
                update.apply(&mut snapshot)?;
                log::info!("Committed: {}", update);
                report.applied.push(update);
            } else {
                log::info!("Not approved: {}", update);
                report.rejected.push(update);
            }
        }

        if !report.applied.is_empty() && self.config.keep_snapshot {
            snapshot.refresh_log(&format!("{} committed {} update(s)", tag, report.applied.len()));
            SnapshotStore::save(&snapshot, &self.config.snapshot_path)?;
            report.saved = true;
        }

        self.snapshot = Some(snapshot);
        self.state = LifecycleState::Analyzed;
        Ok(report)
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Forget the derived plan and datasets
    pub fn reset(&mut self) {
        self.state = LifecycleState::Idle;
        self.execution = true;
        self.snapshot = None;
        self.plan = None;
        self.bindings.clear();
        self.batch = None;
        self.datasets.clear();
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require(&self, stage: &str, allowed: &[LifecycleState]) -> QdriveResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(QdriveError::InvalidState {
                stage: stage.to_string(),
                state: self.state.to_string(),
            })
        }
    }

    fn derived(&self, stage: &str) -> QdriveResult<(&CalibrationSnapshot, &SweepPlan)> {
        match (&self.snapshot, &self.plan) {
            (Some(snapshot), Some(plan)) => Ok((snapshot, plan)),
            _ => Err(QdriveError::InvalidState {
                stage: stage.to_string(),
                state: self.state.to_string(),
            }),
        }
    }

    fn batch_folder(&mut self, store: &DatasetStore) -> QdriveResult<PathBuf> {
        if let Some(folder) = &self.batch {
            return Ok(folder.clone());
        }
        let folder = store.create_batch(self.config.batch_name.as_deref())?;
        self.batch = Some(folder.clone());
        Ok(folder)
    }

    /// One pass on a freshly acquired session; closes whenever preparation
    /// succeeded, and a measurement error wins over a close error
    fn run_pass(&mut self) -> QdriveResult<Option<PathBuf>> {
        let link = self.link.clone();
        let mut session = link.acquire()?;
        self.prepare_hardware(&mut session)?;

        let measured = self.run_measurement(&mut session);
        let closed = self.close_measurement(&mut session);
        match (measured, closed) {
            (Ok(path), Ok(())) => Ok(path),
            (Err(e), closed) => {
                if let Err(c) = closed {
                    log::warn!("Close after failed measurement also failed: {}", c);
                }
                Err(e)
            }
            (Ok(_), Err(c)) => Err(c),
        }
    }
}

/// Artifact folder of one dataset, next to it
fn artifact_folder(dataset: &Path) -> QdriveResult<PathBuf> {
    let stem = dataset
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let folder = dataset
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{}_pic", stem));
    fs::create_dir_all(&folder)
        .map_err(|e| QdriveError::FileError(format!("mkdir {}: {}", folder.display(), e)))?;
    Ok(folder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{AutoApprove, DenyAll};
    use crate::experiment::element_sweep;
    use crate::update::ParameterChange;
    use qdrive_analysis::{AnalysisRegistry, FitInput, FitModel, FitPack, FitRecord};
    use qdrive_backend::{Dataset, LinkOp, SimulatedLink};
    use qdrive_calibration::{register_device, ChipMeta};
    use qdrive_core::{AcquisitionMode, PortSpec};
    use std::cell::Cell;

    /// Minimal power-Rabi style experiment
    struct StubRabi {
        points: usize,
        averaging: u32,
        per_shot: bool,
        cancel_after: Option<(usize, CancellationToken)>,
        measured: Cell<usize>,
    }

    impl StubRabi {
        fn new(points: usize, averaging: u32) -> Self {
            Self {
                points,
                averaging,
                per_shot: false,
                cancel_after: None,
                measured: Cell::new(0),
            }
        }
    }

    impl Experiment for StubRabi {
        fn tag(&self) -> ExperimentTag {
            ExperimentTag::PowerRabi
        }

        fn derive_parameters(
            &self,
            snapshot: &CalibrationSnapshot,
            _config: &LifecycleConfig,
        ) -> QdriveResult<SweepPlan> {
            let amps: Vec<f64> = (0..self.points).map(|k| k as f64 * 0.01).collect();
            let plan = SweepPlan::new(
                snapshot
                    .qubits()
                    .into_iter()
                    .map(|q| element_sweep(q, "amp", amps.clone()))
                    .collect(),
                self.averaging,
            );
            Ok(if self.per_shot {
                plan.with_acquisition(AcquisitionMode::SingleShot)
            } else {
                plan
            })
        }

        fn measure(
            &self,
            session: &mut LinkSession<'_>,
            plan: &SweepPlan,
            bindings: &BTreeMap<ElementId, ChannelBinding>,
        ) -> QdriveResult<Dataset> {
            let dataset = session.run_sweep(&plan.to_spec(self.tag(), bindings))?;
            self.measured.set(self.measured.get() + 1);
            if let Some((after, token)) = &self.cancel_after {
                if self.measured.get() >= *after {
                    token.cancel();
                }
            }
            Ok(dataset)
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
                ParameterChange::PiAmp(pack.scalar("pi_amp")?),
            )))
        }
    }

    struct Bench {
        _dir: tempfile::TempDir,
        config: LifecycleConfig,
    }

    fn bench() -> Bench {
        let dir = tempfile::tempdir().unwrap();
        let specs = vec![
            PortSpec::new("q0:mw", 2, 0),
            PortSpec::new("q1:mw", 2, 1),
            PortSpec::new("q0:res", 18, 0),
            PortSpec::new("q1:res", 18, 0),
        ];
        let snap =
            register_device(&specs, "192.168.1.81", "DR4", ChipMeta::new("2Q", "2Q", 2, 0)).unwrap();
        let snapshot_path = dir.path().join("DR4#81_SumInfo.json");
        SnapshotStore::save(&snap, &snapshot_path).unwrap();
        let config = LifecycleConfig::new(snapshot_path, dir.path().join("data"))
            .with_batch_name("lifecycle");
        Bench { _dir: dir, config }
    }

    fn rabi_engine(_: &FitInput, model: FitModel) -> QdriveResult<FitRecord> {
        Ok(FitRecord::new(
            model,
            [("amplitude", -0.5), ("freq", 5.0), ("phase", 0.0), ("offset", 1.5)],
        ))
    }

    #[test]
    fn test_buffer_guard_before_hardware() {
        let b = bench();
        let link = SimulatedLink::new();
        let log = link.call_log();
        let mut stub = StubRabi::new(1000, 200);
        stub.per_shot = true;
        let mut runner = ExperimentRunner::new(stub, b.config, SharedLink::new(link, "192.168.1.81"));

        let err = runner.set_parameters(true).unwrap_err();
        assert!(matches!(
            err,
            QdriveError::ResourceLimitExceeded { requested: 200_000, ceiling: 131_000, .. }
        ));
        assert_eq!(runner.state(), LifecycleState::Idle);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_averaged_not_limited() {
        let b = bench();
        let mut runner = ExperimentRunner::new(
            StubRabi::new(1000, 200),
            b.config,
            SharedLink::new(SimulatedLink::new(), "192.168.1.81"),
        );
        assert!(runner.set_parameters(true).is_ok());
    }

    #[test]
    fn test_stage_ordering() {
        let b = bench();
        let shared = SharedLink::new(SimulatedLink::new(), "192.168.1.81");
        let mut runner = ExperimentRunner::new(StubRabi::new(21, 100), b.config, shared.clone());

        let mut session = shared.acquire().unwrap();
        assert!(matches!(
            runner.prepare_hardware(&mut session),
            Err(QdriveError::InvalidState { .. })
        ));
        runner.set_parameters(true).unwrap();
        assert!(matches!(
            runner.run_measurement(&mut session),
            Err(QdriveError::InvalidState { .. })
        ));
        drop(session);

        let dispatch = AnalysisDispatch::new(AnalysisRegistry::standard(), rabi_engine);
        assert!(matches!(
            runner.run_analysis(&dispatch, &AutoApprove),
            Err(QdriveError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_repeat_closes_every_pass() {
        let b = bench();
        let link = SimulatedLink::new();
        let log = link.call_log();
        let mut runner =
            ExperimentRunner::new(StubRabi::new(21, 100), b.config, SharedLink::new(link, "192.168.1.81"));

        runner.set_parameters(true).unwrap();
        let report = runner.work_flow(5, &CancellationToken::new()).unwrap();

        assert_eq!(report.passes, 5);
        assert!(!report.monitor);
        assert_eq!(report.datasets.len(), 5);
        assert_eq!(log.count(LinkOp::RunSweep), 5);
        assert_eq!(log.count(LinkOp::ResetAndZero), 5);
        assert_eq!(runner.state(), LifecycleState::Closed);
        for path in &report.datasets {
            assert!(path.exists());
        }
    }

    #[test]
    fn test_close_after_failed_measurement() {
        let b = bench();
        let link = SimulatedLink::new().fail_on(LinkOp::RunSweep);
        let log = link.call_log();
        let mut runner =
            ExperimentRunner::new(StubRabi::new(21, 100), b.config, SharedLink::new(link, "192.168.1.81"));

        runner.set_parameters(true).unwrap();
        let err = runner.work_flow(3, &CancellationToken::new()).unwrap_err();

        assert!(err.is_hardware_error());
        assert_eq!(log.count(LinkOp::RunSweep), 1);
        assert_eq!(log.count(LinkOp::ResetAndZero), 1);
        assert_eq!(runner.state(), LifecycleState::Closed);
    }

    #[test]
    fn test_failed_preparation_resets() {
        let b = bench();
        let link = SimulatedLink::new().fail_on(LinkOp::SetLo);
        let log = link.call_log();
        let mut runner =
            ExperimentRunner::new(StubRabi::new(21, 100), b.config, SharedLink::new(link, "192.168.1.81"));

        runner.set_parameters(true).unwrap();
        assert!(runner.work_flow(1, &CancellationToken::new()).is_err());
        assert_eq!(log.count(LinkOp::RunSweep), 0);
        assert_eq!(log.count(LinkOp::ResetAndZero), 1);
        assert_eq!(runner.state(), LifecycleState::ParametersSet);
    }

    #[test]
    fn test_busy_link() {
        let b = bench();
        let shared = SharedLink::new(SimulatedLink::new(), "192.168.1.81");
        let mut runner = ExperimentRunner::new(StubRabi::new(21, 100), b.config, shared.clone());
        runner.set_parameters(true).unwrap();

        let _held = shared.acquire().unwrap();
        assert!(matches!(
            runner.work_flow(1, &CancellationToken::new()),
            Err(QdriveError::HardwareBusy(_))
        ));
    }

    #[test]
    fn test_cancellation() {
        let b = bench();
        let token = CancellationToken::new();
        let mut stub = StubRabi::new(21, 100);
        stub.cancel_after = Some((2, token.clone()));
        let mut runner = ExperimentRunner::new(
            stub,
            b.config,
            SharedLink::new(SimulatedLink::new(), "192.168.1.81"),
        );

        runner.set_parameters(true).unwrap();
        let err = runner.work_flow(10, &token).unwrap_err();
        assert!(matches!(err, QdriveError::Cancelled { completed: 2 }));
        assert_eq!(runner.datasets().len(), 2);
    }

    #[test]
    fn test_monitor_mode() {
        let b = bench();
        let config = b.config.clone().with_monitor_threshold(10).with_monitor_cap(3);
        let mut runner = ExperimentRunner::new(
            StubRabi::new(21, 100),
            config,
            SharedLink::new(SimulatedLink::new(), "192.168.1.81"),
        );
        runner.set_parameters(true).unwrap();
        let report = runner.work_flow(1000, &CancellationToken::new()).unwrap();
        assert!(report.monitor);
        assert_eq!(report.passes, 3);
        assert!(!report.cancelled);

        // Cancellation ends a monitor with a normal report
        let token = CancellationToken::new();
        token.cancel();
        let report = runner.work_flow(1000, &token).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.passes, 0);
    }

    #[test]
    fn test_analysis_commits_approved() {
        let b = bench();
        let snapshot_path = b.config.snapshot_path.clone();
        let mut runner = ExperimentRunner::new(
            StubRabi::new(21, 100),
            b.config.clone(),
            SharedLink::new(SimulatedLink::new(), "192.168.1.81"),
        );
        runner.set_parameters(true).unwrap();
        runner.work_flow(1, &CancellationToken::new()).unwrap();

        let dispatch = AnalysisDispatch::new(AnalysisRegistry::standard(), rabi_engine);
        let report = runner.run_analysis(&dispatch, &AutoApprove).unwrap();

        assert_eq!(report.applied.len(), 2);
        assert!(report.saved);
        assert!(report.failed_elements().is_empty());
        assert_eq!(runner.state(), LifecycleState::Analyzed);

        let saved = SnapshotStore::load(&snapshot_path).unwrap();
        let note = saved.notebook.note(ElementId::Qubit(0)).unwrap();
        approx::assert_relative_eq!(note.pi_amp, 0.1);
        let dataset = &runner.datasets()[0];
        let artifacts = dataset.with_file_name(format!(
            "{}_pic",
            dataset.file_stem().unwrap().to_string_lossy()
        ));
        assert!(artifacts.join("q0_PowerRabi.json").exists());
    }

    #[test]
    fn test_analysis_denied_leaves_snapshot() {
        let b = bench();
        let snapshot_path = b.config.snapshot_path.clone();
        let before = fs::read_to_string(&snapshot_path).unwrap();
        let mut runner = ExperimentRunner::new(
            StubRabi::new(21, 100),
            b.config.clone(),
            SharedLink::new(SimulatedLink::new(), "192.168.1.81"),
        );
        runner.set_parameters(true).unwrap();
        runner.work_flow(1, &CancellationToken::new()).unwrap();

        let dispatch = AnalysisDispatch::new(AnalysisRegistry::standard(), rabi_engine);
        let report = runner.run_analysis(&dispatch, &DenyAll).unwrap();

        assert!(report.applied.is_empty());
        assert_eq!(report.rejected.len(), 2);
        assert!(!report.saved);
        assert_eq!(fs::read_to_string(&snapshot_path).unwrap(), before);
    }

    #[test]
    fn test_dry_run() {
        let b = bench();
        let link = SimulatedLink::new();
        let log = link.call_log();
        let mut runner =
            ExperimentRunner::new(StubRabi::new(21, 100), b.config, SharedLink::new(link, "192.168.1.81"));

        runner.set_parameters(false).unwrap();
        let report = runner.work_flow(2, &CancellationToken::new()).unwrap();
        assert_eq!(report.passes, 2);
        assert!(report.datasets.is_empty());
        assert_eq!(log.count(LinkOp::RunSweep), 0);
        assert_eq!(log.count(LinkOp::ResetAndZero), 2);

        let dispatch = AnalysisDispatch::new(AnalysisRegistry::standard(), rabi_engine);
        let analysis = runner.run_analysis(&dispatch, &AutoApprove).unwrap();
        assert!(analysis.analyses.is_empty());
        assert!(!analysis.saved);
    }
}
