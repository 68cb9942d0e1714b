//! Instrument link abstraction
//!
//! Gantree: L3_Backend → InstrumentLink
//!
//! Blocking, fallible interface to the control cluster, and the exclusive
//! handle every lifecycle must hold while it drives the hardware.

use crate::dataset::Dataset;
use qdrive_core::{
    AcquisitionMode, Decibel, ElementId, ExperimentTag, Hertz, QdriveError, QdriveResult, Volts,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

// ============================================================================
// Sweep Specification
// ============================================================================

/// Physical channels bound to one element
/// Gantree: ChannelBinding // 채널 바인딩
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelBinding {
    /// Readout channel address
    pub readout: String,
    /// Drive channel address
    pub drive: Option<String>,
    /// Flux channel address
    pub flux: Option<String>,
}

/// Swept variable of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSweep {
    /// Swept element
    pub element: ElementId,
    /// Name of the swept quantity ("freq", "time", "amp", ...)
    pub variable: String,
    /// Sample points
    pub samples: Vec<f64>,
}

/// Everything the instrument needs to execute one sweep
/// Gantree: SweepSpec // 스윕 명세
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    /// Experiment kind
    pub tag: ExperimentTag,
    /// Per-element sweeps
    pub sweeps: Vec<ElementSweep>,
    /// Channel bindings per element
    pub bindings: BTreeMap<ElementId, ChannelBinding>,
    /// Averages (or shots under per-shot acquisition)
    pub averaging: u32,
    /// Acquisition mode
    pub acquisition: AcquisitionMode,
    /// Number of prepared-state traces per sample (e.g. 2 for ground/excited)
    pub states: usize,
    /// Fixed pulse constants keyed "{element}.{name}"
    pub constants: BTreeMap<String, f64>,
}

impl SweepSpec {
    /// Samples per element
    pub fn sample_count(&self, element: ElementId) -> usize {
        self.sweeps
            .iter()
            .find(|s| s.element == element)
            .map(|s| s.samples.len())
            .unwrap_or(0)
    }
}

// ============================================================================
// InstrumentLink
// ============================================================================

/// Connected hardware session identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleId {
    /// Cluster address
    pub address: String,
    /// Session counter assigned by the link
    pub session: u64,
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.session)
    }
}

/// Control-hardware driver
/// Gantree: InstrumentLink // 계측기 링크 trait
///
/// Every call blocks until the instrument answers and fails with
/// `QdriveError::HardwareCommunication`.
pub trait InstrumentLink: Send {
    /// Driver name
    fn name(&self) -> &str;

    /// Open a session with the cluster at `address`
    fn connect(&mut self, address: &str) -> QdriveResult<HandleId>;

    /// Set output attenuation of a channel
    fn set_attenuation(&mut self, handle: &HandleId, target: &str, db: Decibel)
        -> QdriveResult<()>;

    /// Set DC bias of a flux channel
    fn set_bias(&mut self, handle: &HandleId, target: &str, volts: Volts) -> QdriveResult<()>;

    /// Set local oscillator frequency of a channel
    fn set_lo_frequency(&mut self, handle: &HandleId, target: &str, hz: Hertz)
        -> QdriveResult<()>;

    /// Execute a sweep and return the raw labeled dataset
    fn run_sweep(&mut self, handle: &HandleId, spec: &SweepSpec) -> QdriveResult<Dataset>;

    /// Reset the cluster and zero every bias output
    fn reset_and_zero(&mut self, handle: &HandleId) -> QdriveResult<()>;
}

// ============================================================================
// SharedLink
// ============================================================================

/// Instrument link shared between lifecycles, one holder at a time
/// Gantree: SharedLink // 배타적 하드웨어 핸들
#[derive(Clone)]
pub struct SharedLink {
    inner: Arc<Mutex<Box<dyn InstrumentLink>>>,
    address: String,
}

impl SharedLink {
    /// Wrap a link bound to a cluster address
    pub fn new<L: InstrumentLink + 'static>(link: L, address: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(link))),
            address: address.to_string(),
        }
    }

    /// Cluster address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Take exclusive hold of the hardware and connect
    /// Gantree: acquire() -> LinkSession // 핸들 획득
    ///
    /// Fails with `HardwareBusy` instead of waiting when another lifecycle
    /// holds the link.
    pub fn acquire(&self) -> QdriveResult<LinkSession<'_>> {
        let mut guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(QdriveError::HardwareBusy(format!(
                    "{} is held by another lifecycle",
                    self.address
                )))
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!("Recovering instrument link after a panicked holder");
                poisoned.into_inner()
            }
        };
        let handle = guard.connect(&self.address)?;
        log::debug!("Acquired {} via {}", handle, guard.name());
        Ok(LinkSession { guard, handle })
    }
}

/// Exclusive, connected hardware session
pub struct LinkSession<'a> {
    guard: MutexGuard<'a, Box<dyn InstrumentLink>>,
    handle: HandleId,
}

impl<'a> LinkSession<'a> {
    /// Connected handle
    pub fn handle(&self) -> &HandleId {
        &self.handle
    }

    /// Set output attenuation
    pub fn set_attenuation(&mut self, target: &str, db: Decibel) -> QdriveResult<()> {
        self.guard.set_attenuation(&self.handle, target, db)
    }

    /// Set flux bias
    pub fn set_bias(&mut self, target: &str, volts: Volts) -> QdriveResult<()> {
        self.guard.set_bias(&self.handle, target, volts)
    }

    /// Set local oscillator frequency
    pub fn set_lo_frequency(&mut self, target: &str, hz: Hertz) -> QdriveResult<()> {
        self.guard.set_lo_frequency(&self.handle, target, hz)
    }

    /// Run a sweep
    pub fn run_sweep(&mut self, spec: &SweepSpec) -> QdriveResult<Dataset> {
        self.guard.run_sweep(&self.handle, spec)
    }

    /// Reset and zero all outputs
    pub fn reset_and_zero(&mut self) -> QdriveResult<()> {
        self.guard.reset_and_zero(&self.handle)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{LinkCall, SimulatedLink};

    #[test]
    fn test_exclusive_acquire() {
        let shared = SharedLink::new(SimulatedLink::new(), "192.168.1.81");
        let other = shared.clone();

        let session = shared.acquire().unwrap();
        assert_eq!(session.handle().address, "192.168.1.81");
        assert!(matches!(
            other.acquire(),
            Err(QdriveError::HardwareBusy(_))
        ));

        drop(session);
        assert!(other.acquire().is_ok());
    }

    #[test]
    fn test_session_delegates() {
        let link = SimulatedLink::new();
        let log = link.call_log();
        let shared = SharedLink::new(link, "10.0.0.1");

        let mut session = shared.acquire().unwrap();
        session.set_bias("cluster.module4.real_output_0", 0.1).unwrap();
        session.reset_and_zero().unwrap();
        drop(session);

        let calls = log.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], LinkCall::Connect(_)));
        assert!(matches!(calls[2], LinkCall::ResetAndZero));
    }

    #[test]
    fn test_sample_count() {
        let spec = SweepSpec {
            tag: ExperimentTag::PowerRabi,
            sweeps: vec![ElementSweep {
                element: ElementId::Qubit(0),
                variable: "amp".into(),
                samples: vec![0.0, 0.1, 0.2],
            }],
            bindings: BTreeMap::new(),
            averaging: 100,
            acquisition: AcquisitionMode::Averaged,
            states: 1,
            constants: BTreeMap::new(),
        };
        assert_eq!(spec.sample_count(ElementId::Qubit(0)), 3);
        assert_eq!(spec.sample_count(ElementId::Qubit(1)), 0);
    }
}
