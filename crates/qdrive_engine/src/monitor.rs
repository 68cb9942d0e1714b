//! Qubit monitor
//!
//! Gantree: L5_Engine → QubitMonitor
//!
//! Long-running coherence monitor. Each round measures T1, then Ramsey,
//! spin echo and any CPMG trains, then a single-shot population, one
//! lifecycle per experiment. Rounds repeat until cancelled or the round cap is reached;
//! every dataset is kept for later time-trace analysis.

use crate::catalog::{CoherenceRequest, Cpmg, EnergyRelaxation, Ramsey, SingleShot, SpinEcho};
use crate::config::LifecycleConfig;
use crate::experiment::Experiment;
use crate::lifecycle::{CancellationToken, ExperimentRunner};
use crate::sampling::SamplingFunction;
use chrono::{Local, Utc};
use qdrive_backend::SharedLink;
use qdrive_core::{ElementId, ExperimentTag, QdriveError, QdriveResult, Seconds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

// ============================================================================
// Settings
// ============================================================================

/// What one monitor round measures
/// Gantree: MonitorSettings // 모니터 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// T1 window (s)
    pub t1_max_evo_time: Seconds,
    /// T1 qubits
    pub t1_targets: Vec<ElementId>,
    /// T2 window (s)
    pub t2_max_evo_time: Seconds,
    /// T2 qubits
    pub t2_targets: Vec<ElementId>,
    /// Measure Ramsey T2*
    pub ramsey: bool,
    /// Measure spin-echo T2
    pub echo: bool,
    /// Refocusing pulse counts of the CPMG trains run on the T2 qubits
    #[serde(default)]
    pub cpmg_pi_nums: Vec<u32>,
    /// Single-shot qubits; empty means every T1 and T2 qubit, `None` skips
    pub single_shot_targets: Option<Vec<ElementId>>,
    /// Single-shot shots; 0 skips
    pub single_shot_shots: u32,
    /// Coherence averages, or shots per point under per-shot acquisition
    pub averaging: u32,
    /// Coherence time grid
    pub sampling: SamplingFunction,
    /// Per-shot coherence acquisition
    pub per_shot: bool,
    /// Measure, or only plan every lifecycle
    pub execution: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            t1_max_evo_time: 100e-6,
            t1_targets: Vec::new(),
            t2_max_evo_time: 100e-6,
            t2_targets: Vec::new(),
            ramsey: true,
            echo: false,
            cpmg_pi_nums: Vec::new(),
            single_shot_targets: Some(Vec::new()),
            single_shot_shots: 10_000,
            averaging: 300,
            sampling: SamplingFunction::Linear { points: 100 },
            per_shot: false,
            execution: true,
        }
    }
}

impl MonitorSettings {
    /// Monitor T1 and Ramsey on the same qubits
    pub fn new<I: IntoIterator<Item = ElementId>>(targets: I) -> Self {
        let targets: Vec<ElementId> = targets.into_iter().collect();
        Self {
            t1_targets: targets.clone(),
            t2_targets: targets,
            ..Self::default()
        }
    }

    /// Single-shot qubits after defaulting
    pub fn resolved_single_shot_targets(&self) -> Option<Vec<ElementId>> {
        if self.single_shot_shots == 0 {
            return None;
        }
        let targets = self.single_shot_targets.as_ref()?;
        if !targets.is_empty() {
            return Some(targets.clone());
        }
        let union: BTreeSet<ElementId> = self
            .t1_targets
            .iter()
            .chain(self.t2_targets.iter())
            .copied()
            .collect();
        if union.is_empty() {
            None
        } else {
            Some(union.into_iter().collect())
        }
    }

    fn measures_t1(&self) -> bool {
        !self.t1_targets.is_empty() && self.t1_max_evo_time > 0.0
    }

    fn measures_t2(&self) -> bool {
        !self.t2_targets.is_empty()
            && self.t2_max_evo_time > 0.0
            && (self.ramsey || self.echo || !self.cpmg_pi_nums.is_empty())
    }

    fn coherence(&self, max_evo_time: Seconds, targets: &[ElementId]) -> CoherenceRequest {
        CoherenceRequest::new(max_evo_time, targets.iter().copied())
            .with_sampling(self.sampling)
            .with_averaging(self.averaging)
            .with_single_shot(self.per_shot)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Outcome of a monitor run
/// Gantree: MonitorReport // 모니터 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Fully completed rounds
    pub rounds: usize,
    /// Persisted datasets in measurement order
    pub datasets: Vec<(ExperimentTag, PathBuf)>,
    /// Stopped by cancellation
    pub cancelled: bool,
}

impl MonitorReport {
    /// Datasets of one experiment kind
    pub fn datasets_of(&self, tag: ExperimentTag) -> Vec<&PathBuf> {
        self.datasets
            .iter()
            .filter(|(t, _)| *t == tag)
            .map(|(_, p)| p)
            .collect()
    }
}

// ============================================================================
// QubitMonitor
// ============================================================================

/// Repeating coherence monitor
/// Gantree: QubitMonitor // 큐비트 모니터
pub struct QubitMonitor {
    settings: MonitorSettings,
    config: LifecycleConfig,
    link: SharedLink,
    round_cap: Option<usize>,
}

impl QubitMonitor {
    /// Create a monitor; every round shares one batch folder
    pub fn new(settings: MonitorSettings, config: LifecycleConfig, link: SharedLink) -> Self {
        let mut config = config;
        if config.batch_name.is_none() {
            config.batch_name = Some(format!("Monitor_{}", Local::now().format("H%HM%MS%S")));
        }
        Self {
            settings,
            config,
            link,
            round_cap: None,
        }
    }

    /// Builder: stop after this many rounds
    pub fn with_round_cap(mut self, cap: usize) -> Self {
        self.round_cap = Some(cap);
        self
    }

    /// Settings
    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Run rounds until cancelled or capped
    /// Gantree: run(cancel) -> MonitorReport // 모니터링 시작
    pub fn run(&self, cancel: &CancellationToken) -> QdriveResult<MonitorReport> {
        let single_shot = self.settings.resolved_single_shot_targets();
        if !self.settings.measures_t1() && !self.settings.measures_t2() && single_shot.is_none() {
            return Err(QdriveError::ParameterValidation(
                "nothing to monitor".to_string(),
            ));
        }

        let started = Utc::now();
        let mut report = MonitorReport::default();
        while self.round_cap.map_or(true, |cap| report.rounds < cap) {
            if !self.round(single_shot.as_deref(), cancel, &mut report)? {
                report.cancelled = true;
                break;
            }
            report.rounds += 1;
            let hours = (Utc::now() - started).num_seconds() as f64 / 3600.0;
            log::info!("Monitor round {} done, {:.2} h recorded", report.rounds, hours);
        }

        if report.cancelled {
            log::info!("Monitor cancelled after {} round(s)", report.rounds);
        }
        Ok(report)
    }

    /// One round; false when cancelled part way
    fn round(
        &self,
        single_shot: Option<&[ElementId]>,
        cancel: &CancellationToken,
        report: &mut MonitorReport,
    ) -> QdriveResult<bool> {
        let s = &self.settings;
        if s.measures_t1() {
            let request = s.coherence(s.t1_max_evo_time, &s.t1_targets);
            if !self.step(EnergyRelaxation(request), cancel, report)? {
                return Ok(false);
            }
        }
        if s.measures_t2() {
            if s.ramsey {
                let request = s.coherence(s.t2_max_evo_time, &s.t2_targets);
                if !self.step(Ramsey(request), cancel, report)? {
                    return Ok(false);
                }
            }
            if s.echo {
                let request = s.coherence(s.t2_max_evo_time, &s.t2_targets);
                if !self.step(SpinEcho(request), cancel, report)? {
                    return Ok(false);
                }
            }
            for pi_num in &s.cpmg_pi_nums {
                let request = s.coherence(s.t2_max_evo_time, &s.t2_targets);
                if !self.step(Cpmg::new(request, *pi_num), cancel, report)? {
                    return Ok(false);
                }
            }
        }
        if let Some(targets) = single_shot {
            let exp = SingleShot::new(targets.iter().copied(), s.single_shot_shots);
            if !self.step(exp, cancel, report)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// One single-pass lifecycle; false when cancelled before it ran
    fn step<E: Experiment>(
        &self,
        experiment: E,
        cancel: &CancellationToken,
        report: &mut MonitorReport,
    ) -> QdriveResult<bool> {
        if cancel.is_cancelled() {
            return Ok(false);
        }
        let tag = experiment.tag();
        log::info!("Monitor: measuring {}", tag);

        let mut runner = ExperimentRunner::new(experiment, self.config.clone(), self.link.clone());
        runner.set_parameters(self.settings.execution)?;
        match runner.work_flow(1, cancel) {
            Ok(flow) => {
                report
                    .datasets
                    .extend(flow.datasets.into_iter().map(|p| (tag, p)));
                Ok(true)
            }
            Err(QdriveError::Cancelled { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrive_backend::{LinkOp, SimulatedLink};
    use qdrive_calibration::{register_device, ChipMeta, SnapshotStore};
    use qdrive_core::PortSpec;

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
        let config = LifecycleConfig::new(snapshot_path, dir.path().join("data"));
        Bench { _dir: dir, config }
    }

    fn small(targets: &[usize]) -> MonitorSettings {
        let mut settings = MonitorSettings::new(targets.iter().map(|q| ElementId::Qubit(*q)));
        settings.sampling = SamplingFunction::Linear { points: 5 };
        settings.averaging = 10;
        settings.single_shot_shots = 100;
        settings
    }

    #[test]
    fn test_single_shot_targets_default_to_union() {
        let mut settings = MonitorSettings::default();
        settings.t1_targets = vec![ElementId::Qubit(1)];
        settings.t2_targets = vec![ElementId::Qubit(0), ElementId::Qubit(1)];
        assert_eq!(
            settings.resolved_single_shot_targets(),
            Some(vec![ElementId::Qubit(0), ElementId::Qubit(1)])
        );

        settings.single_shot_targets = Some(vec![ElementId::Qubit(1)]);
        assert_eq!(settings.resolved_single_shot_targets(), Some(vec![ElementId::Qubit(1)]));

        settings.single_shot_shots = 0;
        assert_eq!(settings.resolved_single_shot_targets(), None);
    }

    #[test]
    fn test_rounds_until_cap() {
        let b = bench();
        let link = SimulatedLink::new();
        let log = link.call_log();
        let monitor = QubitMonitor::new(small(&[0, 1]), b.config, SharedLink::new(link, "192.168.1.81"))
            .with_round_cap(2);

        let report = monitor.run(&CancellationToken::new()).unwrap();
        assert_eq!(report.rounds, 2);
        assert!(!report.cancelled);
        // T1, Ramsey, single shot per round
        assert_eq!(report.datasets.len(), 6);
        assert_eq!(report.datasets_of(ExperimentTag::Ramsey).len(), 2);
        assert_eq!(log.count(LinkOp::RunSweep), 6);
        assert_eq!(log.count(LinkOp::ResetAndZero), 6);
        assert!(report.datasets.iter().all(|(_, p)| p.exists()));
    }

    #[test]
    fn test_echo_and_ramsey() {
        let b = bench();
        let mut settings = small(&[0]);
        settings.echo = true;
        settings.single_shot_targets = None;
        let monitor = QubitMonitor::new(
            settings,
            b.config,
            SharedLink::new(SimulatedLink::new(), "192.168.1.81"),
        )
        .with_round_cap(1);

        let report = monitor.run(&CancellationToken::new()).unwrap();
        let tags: Vec<ExperimentTag> = report.datasets.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            tags,
            vec![
                ExperimentTag::EnergyRelaxation,
                ExperimentTag::Ramsey,
                ExperimentTag::SpinEcho
            ]
        );
    }

    #[test]
    fn test_cpmg_trains_follow_echo() {
        let b = bench();
        let mut settings = small(&[0, 1]);
        settings.ramsey = false;
        settings.echo = true;
        settings.cpmg_pi_nums = vec![2, 8];
        settings.single_shot_targets = None;
        let link = SimulatedLink::new();
        let log = link.call_log();
        let monitor = QubitMonitor::new(settings, b.config, SharedLink::new(link, "192.168.1.81"))
            .with_round_cap(2);

        let report = monitor.run(&CancellationToken::new()).unwrap();
        // T1, echo and two CPMG trains per round
        assert_eq!(report.datasets.len(), 8);
        assert_eq!(report.datasets_of(ExperimentTag::Cpmg).len(), 4);
        assert_eq!(log.count(LinkOp::RunSweep), 8);
        let first: Vec<ExperimentTag> = report.datasets[..4].iter().map(|(t, _)| *t).collect();
        assert_eq!(
            first,
            vec![
                ExperimentTag::EnergyRelaxation,
                ExperimentTag::SpinEcho,
                ExperimentTag::Cpmg,
                ExperimentTag::Cpmg
            ]
        );
    }

    #[test]
    fn test_cpmg_only_counts_as_t2() {
        let mut settings = MonitorSettings::new([ElementId::Qubit(0)]);
        settings.ramsey = false;
        assert!(!settings.measures_t2());
        settings.cpmg_pi_nums = vec![4];
        assert!(settings.measures_t2());
    }

    #[test]
    fn test_cancelled_before_first_round() {
        let b = bench();
        let link = SimulatedLink::new();
        let log = link.call_log();
        let monitor = QubitMonitor::new(small(&[0]), b.config, SharedLink::new(link, "192.168.1.81"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = monitor.run(&cancel).unwrap();
        assert_eq!(report.rounds, 0);
        assert!(report.cancelled);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_nothing_to_monitor() {
        let b = bench();
        let mut settings = MonitorSettings::default();
        settings.single_shot_targets = None;
        let monitor = QubitMonitor::new(
            settings,
            b.config,
            SharedLink::new(SimulatedLink::new(), "192.168.1.81"),
        );
        let err = monitor.run(&CancellationToken::new()).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_dry_run_plans_only() {
        let b = bench();
        let mut settings = small(&[0]);
        settings.execution = false;
        let link = SimulatedLink::new();
        let log = link.call_log();
        let monitor = QubitMonitor::new(settings, b.config, SharedLink::new(link, "192.168.1.81"))
            .with_round_cap(1);

        let report = monitor.run(&CancellationToken::new()).unwrap();
        assert_eq!(report.rounds, 1);
        assert!(report.datasets.is_empty());
        assert_eq!(log.count(LinkOp::RunSweep), 0);
    }
}
