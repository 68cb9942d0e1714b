//! Calibration updates
//!
//! Gantree: L5_Engine → CalibrationUpdate
//!
//! Typed changes proposed by an experiment from its fit packs. Nothing
//! touches the snapshot until an update is approved and applied.

use chrono::Utc;
use qdrive_calibration::{CalibrationSnapshot, DiscriminatorModel};
use qdrive_core::{ElementId, Hertz, IqPoint, QdriveResult, Seconds, Volts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter change carried by an update
/// Gantree: ParameterChange // 변경 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterChange {
    /// Dressed cavity found; readout moves onto it
    DressedCavity(Hertz),
    /// Readout frequency
    ReadoutFreq(Hertz),
    /// Drive frequency
    DriveFreq(Hertz),
    /// Pi-pulse amplitude
    PiAmp(f64),
    /// Pi-pulse duration
    PiDuration(Seconds),
    /// DRAG coefficient
    DragCoef(f64),
    /// Append to the T1 history
    T1(Seconds),
    /// Append to the Ramsey T2* history
    T2Star(Seconds),
    /// Append to the echo T2 history
    T2Echo(Seconds),
    /// Flux sweet spot of a tunable qubit
    SweetSpot(Volts),
    /// Ground-state reference point
    RefIq(IqPoint),
    /// Trained discrimination model, also recording its rotation angle
    Discriminator(DiscriminatorModel),
}

/// Proposed change of one element
/// Gantree: CalibrationUpdate // 캘리브레이션 갱신
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationUpdate {
    /// Target element
    pub element: ElementId,
    /// Change
    pub change: ParameterChange,
}

impl CalibrationUpdate {
    /// Create new update
    pub fn new(element: ElementId, change: ParameterChange) -> Self {
        Self { element, change }
    }

    /// Build a discriminator update from centers and fit-pack scalars
    pub fn discriminator(
        element: ElementId,
        ground: IqPoint,
        excited: IqPoint,
        rotation_deg: f64,
        threshold: f64,
        fidelity: f64,
    ) -> Self {
        Self::new(
            element,
            ParameterChange::Discriminator(DiscriminatorModel {
                ground,
                excited,
                rotation_deg,
                threshold,
                fidelity,
                trained_at: Utc::now(),
            }),
        )
    }

    /// Apply to a snapshot
    /// Gantree: apply(snapshot) -> Result // 적용
    pub fn apply(&self, snapshot: &mut CalibrationSnapshot) -> QdriveResult<()> {
        snapshot.check_element(self.element)?;
        match &self.change {
            ParameterChange::RefIq(point) => {
                return snapshot.memo_ref_iq(&BTreeMap::from([(self.element, *point)]));
            }
            ParameterChange::Discriminator(model) => {
                snapshot
                    .memo_rotation_angle(&BTreeMap::from([(self.element, model.rotation_deg)]))?;
                snapshot.discriminators.store(self.element, model.clone());
                return Ok(());
            }
            ParameterChange::SweetSpot(volts) => {
                snapshot.flux.set_sweet_spot(self.element, *volts);
                return Ok(());
            }
            _ => {}
        }

        let note = snapshot.notebook.note_mut(self.element)?;
        match &self.change {
            ParameterChange::DressedCavity(freq) => {
                note.dressed_cavity_freq = Some(*freq);
                note.readout_freq = *freq;
            }
            ParameterChange::ReadoutFreq(freq) => note.readout_freq = *freq,
            ParameterChange::DriveFreq(freq) => note.drive_freq = *freq,
            ParameterChange::PiAmp(amp) => note.pi_amp = *amp,
            ParameterChange::PiDuration(duration) => note.pi_duration = *duration,
            ParameterChange::DragCoef(coef) => note.drag_coef = *coef,
            ParameterChange::T1(t) => note.t1_history.push(*t),
            ParameterChange::T2Star(t) => note.t2_history.push(*t),
            ParameterChange::T2Echo(t) => note.t2_echo_history.push(*t),
            ParameterChange::RefIq(_)
            | ParameterChange::Discriminator(_)
            | ParameterChange::SweetSpot(_) => {}
        }
        Ok(())
    }
}

impl fmt::Display for CalibrationUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.change {
            ParameterChange::DressedCavity(v) => {
                write!(f, "{} dressed cavity → {:.6} GHz", self.element, v * 1e-9)
            }
            ParameterChange::ReadoutFreq(v) => {
                write!(f, "{} readout freq → {:.6} GHz", self.element, v * 1e-9)
            }
            ParameterChange::DriveFreq(v) => {
                write!(f, "{} drive freq → {:.6} GHz", self.element, v * 1e-9)
            }
            ParameterChange::PiAmp(v) => write!(f, "{} pi amp → {:.4}", self.element, v),
            ParameterChange::PiDuration(v) => {
                write!(f, "{} pi duration → {:.0} ns", self.element, v * 1e9)
            }
            ParameterChange::DragCoef(v) => write!(f, "{} drag coef → {:.4}", self.element, v),
            ParameterChange::T1(v) => write!(f, "{} T1 += {:.2} µs", self.element, v * 1e6),
            ParameterChange::T2Star(v) => write!(f, "{} T2* += {:.2} µs", self.element, v * 1e6),
            ParameterChange::T2Echo(v) => write!(f, "{} T2 += {:.2} µs", self.element, v * 1e6),
            ParameterChange::SweetSpot(v) => {
                write!(f, "{} sweet spot → {:.4} V", self.element, v)
            }
            ParameterChange::RefIq(p) => {
                write!(f, "{} ref IQ → ({:.3e}, {:.3e})", self.element, p.i, p.q)
            }
            ParameterChange::Discriminator(m) => write!(
                f,
                "{} discriminator (fidelity {:.3}, rotation {:.1}°)",
                self.element, m.fidelity, m.rotation_deg
            ),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use qdrive_calibration::{register_device, ChipMeta};
    use qdrive_core::PortSpec;

    fn snapshot() -> CalibrationSnapshot {
        let specs = vec![
            PortSpec::new("q0:mw", 2, 0),
            PortSpec::new("q1:mw", 2, 1),
            PortSpec::new("q0:res", 18, 0),
            PortSpec::new("q1:res", 18, 0),
        ];
        register_device(&specs, "192.168.1.81", "DR4", ChipMeta::new("2Q", "2Q", 2, 0)).unwrap()
    }

    #[test]
    fn test_notebook_changes() {
        let mut snap = snapshot();
        let q0 = ElementId::Qubit(0);

        CalibrationUpdate::new(q0, ParameterChange::PiAmp(0.12)).apply(&mut snap).unwrap();
        CalibrationUpdate::new(q0, ParameterChange::T1(30e-6)).apply(&mut snap).unwrap();
        CalibrationUpdate::new(q0, ParameterChange::DressedCavity(5.95e9))
            .apply(&mut snap)
            .unwrap();

        let note = snap.notebook.note(q0).unwrap();
        assert_eq!(note.pi_amp, 0.12);
        assert_eq!(note.latest_t1(), Some(30e-6));
        assert_eq!(note.readout_freq, 5.95e9);
        assert_eq!(note.dressed_cavity_freq, Some(5.95e9));
    }

    #[test]
    fn test_discriminator_records_angle() {
        let mut snap = snapshot();
        let q1 = ElementId::Qubit(1);
        let update = CalibrationUpdate::discriminator(
            q1,
            IqPoint::new(0.0, 0.0),
            IqPoint::new(0.0, 1e-3),
            270.0,
            5e-4,
            0.93,
        );
        update.apply(&mut snap).unwrap();

        assert!(snap.discriminators.is_ready(q1));
        assert_eq!(snap.rotation_angle[&q1], 270.0);
        assert!(update.to_string().contains("0.930"));
    }

    #[test]
    fn test_sweet_spot_moves_flux_table() {
        let mut snap = snapshot();
        let q0 = ElementId::Qubit(0);
        let before = snap.notebook.note(q0).unwrap().clone();

        let update = CalibrationUpdate::new(q0, ParameterChange::SweetSpot(-0.125));
        update.apply(&mut snap).unwrap();

        assert_eq!(snap.flux.proper_bias(q0).unwrap(), -0.125);
        assert_eq!(snap.notebook.note(q0).unwrap(), &before);
        assert_eq!(update.to_string(), "q0 sweet spot → -0.1250 V");
    }

    #[test]
    fn test_unknown_element_rejected() {
        let mut snap = snapshot();
        let update = CalibrationUpdate::new(ElementId::Qubit(7), ParameterChange::PiAmp(0.1));
        assert!(update.apply(&mut snap).is_err());
    }
}
