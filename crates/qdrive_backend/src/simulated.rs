//! Simulated instrument link
//!
//! Gantree: L3_Backend → SimulatedLink
//!
//! Stands in for the control cluster: records every call, produces datasets
//! from a pluggable response model with seeded uniform noise, and can be told
//! to fail a given operation.

use crate::dataset::{DataVariable, Dataset, DatasetMetadata};
use crate::link::{HandleId, InstrumentLink, SweepSpec};
use qdrive_core::{Decibel, ElementId, ExperimentTag, Hertz, IqPoint, QdriveError, QdriveResult, Volts};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Response model: (element, prepared state, sweep value) -> noiseless IQ
pub type ResponseFn = Box<dyn Fn(ElementId, usize, f64) -> IqPoint + Send>;

/// Link operation kinds, used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkOp {
    /// connect
    Connect,
    /// set_attenuation
    SetAttenuation,
    /// set_bias
    SetBias,
    /// set_lo_frequency
    SetLo,
    /// run_sweep
    RunSweep,
    /// reset_and_zero
    ResetAndZero,
}

/// Recorded link call
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCall {
    /// Session opened with address
    Connect(String),
    /// Attenuation set
    SetAttenuation {
        /// Channel
        target: String,
        /// Attenuation
        db: Decibel,
    },
    /// Bias set
    SetBias {
        /// Channel
        target: String,
        /// Bias
        volts: Volts,
    },
    /// LO frequency set
    SetLo {
        /// Channel
        target: String,
        /// Frequency
        hz: Hertz,
    },
    /// Sweep executed
    RunSweep(ExperimentTag),
    /// Cluster reset
    ResetAndZero,
}

impl LinkCall {
    /// Operation kind of this call
    pub fn op(&self) -> LinkOp {
        match self {
            LinkCall::Connect(_) => LinkOp::Connect,
            LinkCall::SetAttenuation { .. } => LinkOp::SetAttenuation,
            LinkCall::SetBias { .. } => LinkOp::SetBias,
            LinkCall::SetLo { .. } => LinkOp::SetLo,
            LinkCall::RunSweep(_) => LinkOp::RunSweep,
            LinkCall::ResetAndZero => LinkOp::ResetAndZero,
        }
    }
}

/// Call log shared between the link and its observers
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<LinkCall>>>,
}

impl CallLog {
    fn push(&self, call: LinkCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// Snapshot of recorded calls
    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded calls of one kind
    pub fn count(&self, op: LinkOp) -> usize {
        self.calls().iter().filter(|c| c.op() == op).count()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

/// Simulated control cluster
/// Gantree: SimulatedLink // 시뮬레이션 링크
pub struct SimulatedLink {
    name: String,
    sessions: u64,
    noise: f64,
    rng: StdRng,
    response: ResponseFn,
    log: CallLog,
    failing: HashSet<LinkOp>,
}

impl SimulatedLink {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Noiseless link; the excited state reads 1 mV further along I
    pub fn new() -> Self {
        Self {
            name: "qdrive_simulated".to_string(),
            sessions: 0,
            noise: 0.0,
            rng: StdRng::from_entropy(),
            response: Box::new(|_, state, _| IqPoint::new(state as f64 * 1e-3, 0.0)),
            log: CallLog::default(),
            failing: HashSet::new(),
        }
    }

    /// Set seed for reproducibility
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Set uniform noise amplitude per shot
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.noise = amplitude.abs();
        self
    }

    /// Set the response model
    pub fn with_response<F>(mut self, response: F) -> Self
    where
        F: Fn(ElementId, usize, f64) -> IqPoint + Send + 'static,
    {
        self.response = Box::new(response);
        self
    }

    /// Make every call of `op` fail
    pub fn fail_on(mut self, op: LinkOp) -> Self {
        self.failing.insert(op);
        self
    }

    /// Shared call log
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn record(&mut self, call: LinkCall) -> QdriveResult<()> {
        let op = call.op();
        self.log.push(call);
        if self.failing.contains(&op) {
            return Err(QdriveError::HardwareCommunication(format!(
                "{}: injected {:?} failure",
                self.name, op
            )));
        }
        Ok(())
    }

    fn jitter(&mut self) -> f64 {
        if self.noise > 0.0 {
            self.rng.gen_range(-self.noise..=self.noise)
        } else {
            0.0
        }
    }

    fn sample_element(
        &mut self,
        element: ElementId,
        samples: &[f64],
        spec: &SweepSpec,
    ) -> QdriveResult<DataVariable> {
        let states = spec.states.max(1);
        let n = samples.len();
        let axis = Dataset::axis_name(element);

        if spec.acquisition.is_per_shot() {
            let m = spec.averaging.max(1) as usize;
            let mut values = vec![0.0; 2 * states * n * m];
            for s in 0..states {
                for (p, &x) in samples.iter().enumerate() {
                    let ideal = (self.response)(element, s, x);
                    for k in 0..m {
                        values[(s * n + p) * m + k] = ideal.i + self.jitter();
                        values[((states + s) * n + p) * m + k] = ideal.q + self.jitter();
                    }
                }
            }
            DataVariable::new(
                vec!["mixer".into(), "state".into(), axis, "shot".into()],
                vec![2, states, n, m],
                values,
            )
        } else {
            // Averaging shrinks the noise by sqrt(averages)
            let scale = 1.0 / (spec.averaging.max(1) as f64).sqrt();
            let mut traces = Vec::with_capacity(states);
            for s in 0..states {
                let mut i = Vec::with_capacity(n);
                let mut q = Vec::with_capacity(n);
                for &x in samples {
                    let ideal = (self.response)(element, s, x);
                    i.push(ideal.i + self.jitter() * scale);
                    q.push(ideal.q + self.jitter() * scale);
                }
                traces.push((i, q));
            }
            DataVariable::averaged(&axis, &traces)
        }
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentLink for SimulatedLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self, address: &str) -> QdriveResult<HandleId> {
        self.record(LinkCall::Connect(address.to_string()))?;
        if address.is_empty() {
            return Err(QdriveError::HardwareCommunication(
                "empty cluster address".to_string(),
            ));
        }
        self.sessions += 1;
        Ok(HandleId {
            address: address.to_string(),
            session: self.sessions,
        })
    }

    fn set_attenuation(&mut self, _handle: &HandleId, target: &str, db: Decibel) -> QdriveResult<()> {
        self.record(LinkCall::SetAttenuation {
            target: target.to_string(),
            db,
        })
    }

    fn set_bias(&mut self, _handle: &HandleId, target: &str, volts: Volts) -> QdriveResult<()> {
        self.record(LinkCall::SetBias {
            target: target.to_string(),
            volts,
        })
    }

    fn set_lo_frequency(&mut self, _handle: &HandleId, target: &str, hz: Hertz) -> QdriveResult<()> {
        self.record(LinkCall::SetLo {
            target: target.to_string(),
            hz,
        })
    }

    fn run_sweep(&mut self, _handle: &HandleId, spec: &SweepSpec) -> QdriveResult<Dataset> {
        self.record(LinkCall::RunSweep(spec.tag))?;
        if spec.sweeps.is_empty() {
            return Err(QdriveError::HardwareCommunication(format!(
                "{} sweep without elements",
                spec.tag
            )));
        }

        let mut metadata = DatasetMetadata::new(spec.tag, spec.acquisition, spec.averaging);
        metadata.calibration = spec.constants.clone();
        metadata.attrs.insert("link".into(), self.name.clone());
        let mut dataset = Dataset::new(metadata);

        for sweep in &spec.sweeps {
            let variable = self.sample_element(sweep.element, &sweep.samples, spec)?;
            dataset.insert_element(sweep.element, variable, sweep.samples.clone())?;
        }
        log::debug!(
            "Simulated {} over {} element(s)",
            spec.tag,
            spec.sweeps.len()
        );
        Ok(dataset)
    }

    fn reset_and_zero(&mut self, _handle: &HandleId) -> QdriveResult<()> {
        self.record(LinkCall::ResetAndZero)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ElementSweep;
    use qdrive_core::AcquisitionMode;
    use std::collections::BTreeMap;

    fn handle() -> HandleId {
        HandleId {
            address: "sim".into(),
            session: 1,
        }
    }

    fn spec(acquisition: AcquisitionMode, averaging: u32) -> SweepSpec {
        SweepSpec {
            tag: ExperimentTag::SingleShot,
            sweeps: vec![ElementSweep {
                element: ElementId::Qubit(2),
                variable: "index".into(),
                samples: vec![0.0, 1.0],
            }],
            bindings: BTreeMap::new(),
            averaging,
            acquisition,
            states: 2,
            constants: BTreeMap::new(),
        }
    }

    #[test]
    fn test_averaged_sweep_uses_response() {
        let mut link = SimulatedLink::new().with_response(|_, state, x| {
            IqPoint::new(x + state as f64 * 10.0, -x)
        });
        let ds = link.run_sweep(&handle(), &spec(AcquisitionMode::Averaged, 100)).unwrap();

        let var = ds.variable(ElementId::Qubit(2)).unwrap();
        assert_eq!(var.shape, vec![2, 2, 2]);
        let (i, q) = var.trace(1).unwrap();
        assert_eq!(i, vec![10.0, 11.0]);
        assert_eq!(q, vec![0.0, -1.0]);
        assert_eq!(ds.metadata.tag, ExperimentTag::SingleShot);
    }

    #[test]
    fn test_per_shot_layout() {
        let mut link = SimulatedLink::new().with_seed(7).with_noise(1e-4);
        let ds = link.run_sweep(&handle(), &spec(AcquisitionMode::SingleShot, 50)).unwrap();

        let var = ds.variable(ElementId::Qubit(2)).unwrap();
        assert_eq!(var.shape, vec![2, 2, 2, 50]);
        let shots = var.shots(1, 0).unwrap();
        assert_eq!(shots.len(), 50);
        for shot in shots {
            assert!((shot.i - 1e-3).abs() <= 1e-4 + 1e-12);
        }
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let s = spec(AcquisitionMode::Averaged, 1);
        let a = SimulatedLink::new().with_seed(3).with_noise(1.0).run_sweep(&handle(), &s).unwrap();
        let b = SimulatedLink::new().with_seed(3).with_noise(1.0).run_sweep(&handle(), &s).unwrap();
        assert_eq!(a.variables, b.variables);
    }

    #[test]
    fn test_failure_injection_and_log() {
        let mut link = SimulatedLink::new().fail_on(LinkOp::SetBias);
        let log = link.call_log();

        assert!(link.set_attenuation(&handle(), "ch", 10.0).is_ok());
        let err = link.set_bias(&handle(), "ch", 0.2).unwrap_err();
        assert!(err.is_hardware_error());

        assert_eq!(log.calls().len(), 2);
        assert_eq!(log.count(LinkOp::SetBias), 1);
        log.clear();
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_empty_sweep_rejected() {
        let mut s = spec(AcquisitionMode::Averaged, 1);
        s.sweeps.clear();
        assert!(SimulatedLink::new().run_sweep(&handle(), &s).is_err());
    }
}
