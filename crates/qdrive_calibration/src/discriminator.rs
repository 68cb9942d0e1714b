//! Learned readout discrimination models
//!
//! Gantree: L2_Calibration → Discriminator
//!
//! Nearest-center two-state classifier per qubit, trained by single-shot
//! experiments.

use chrono::{DateTime, Utc};
use qdrive_core::{ElementId, IqPoint, QdriveError, QdriveResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Readout discrimination model of one qubit
/// Gantree: DiscriminatorModel // 판별 모델
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorModel {
    /// Ground-state cloud center
    pub ground: IqPoint,

    /// Excited-state cloud center
    pub excited: IqPoint,

    /// Angle rotating the ground→excited axis onto I (degrees)
    pub rotation_deg: f64,

    /// Decision threshold on the rotated I axis
    pub threshold: f64,

    /// Assignment fidelity at training
    pub fidelity: f64,

    /// Training time
    pub trained_at: DateTime<Utc>,
}

impl DiscriminatorModel {
    /// Classify one shot, `true` for excited
    pub fn classify(&self, shot: &IqPoint) -> bool {
        shot.distance(&self.excited) < shot.distance(&self.ground)
    }

    /// Excited-state population of a batch of shots
    pub fn excited_population(&self, shots: &[IqPoint]) -> f64 {
        if shots.is_empty() {
            return 0.0;
        }
        let excited = shots.iter().filter(|s| self.classify(s)).count();
        excited as f64 / shots.len() as f64
    }
}

/// Discrimination models of every trained qubit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscriminatorBank {
    models: BTreeMap<ElementId, DiscriminatorModel>,
}

impl DiscriminatorBank {
    /// Model of a qubit; fails when none was trained
    pub fn model(&self, qubit: ElementId) -> QdriveResult<&DiscriminatorModel> {
        self.models.get(&qubit).ok_or_else(|| {
            QdriveError::ParameterValidation(format!(
                "no readout discriminator trained for {}",
                qubit
            ))
        })
    }

    /// Store a model, replacing the previous one
    pub fn store(&mut self, qubit: ElementId, model: DiscriminatorModel) {
        self.models.insert(qubit, model);
    }

    /// Check if a model is available
    pub fn is_ready(&self, qubit: ElementId) -> bool {
        self.models.contains_key(&qubit)
    }

    /// Number of trained models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check if no model is trained
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> DiscriminatorModel {
        DiscriminatorModel {
            ground: IqPoint::new(0.0, 0.0),
            excited: IqPoint::new(1.0, 0.0),
            rotation_deg: 0.0,
            threshold: 0.5,
            fidelity: 0.9,
            trained_at: Utc::now(),
        }
    }

    #[test]
    fn test_classify() {
        let m = model();
        assert!(m.classify(&IqPoint::new(0.9, 0.1)));
        assert!(!m.classify(&IqPoint::new(0.1, -0.1)));
        let shots = [
            IqPoint::new(0.9, 0.0),
            IqPoint::new(0.1, 0.0),
            IqPoint::new(1.1, 0.0),
            IqPoint::new(-0.2, 0.0),
        ];
        assert!((m.excited_population(&shots) - 0.5).abs() < 1e-12);
        assert_eq!(m.excited_population(&[]), 0.0);
    }

    #[test]
    fn test_bank() {
        let mut bank = DiscriminatorBank::default();
        assert!(bank.model(ElementId::Qubit(0)).is_err());
        bank.store(ElementId::Qubit(0), model());
        assert!(bank.is_ready(ElementId::Qubit(0)));
        assert_eq!(bank.len(), 1);
    }
}
