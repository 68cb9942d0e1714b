//! Confirmation port
//!
//! Gantree: L5_Engine → ConfirmationPort
//!
//! Approval of proposed calibration updates is injected so the lifecycle
//! runs headless; an interactive front end implements the same trait.

use crate::update::CalibrationUpdate;
use qdrive_core::{ElementId, ExperimentTag};
use std::collections::BTreeSet;

/// Decision on a batch of proposals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval {
    /// Commit every proposal
    All,
    /// Commit proposals of these elements only
    Only(BTreeSet<ElementId>),
    /// Commit nothing
    None,
}

impl Approval {
    /// Check if the proposal for `element` is approved
    pub fn approves(&self, element: ElementId) -> bool {
        match self {
            Approval::All => true,
            Approval::Only(elements) => elements.contains(&element),
            Approval::None => false,
        }
    }
}

/// Injected approval of calibration commits
/// Gantree: ConfirmationPort // 확인 포트 trait
pub trait ConfirmationPort {
    /// Decide which proposals of an analysis pass get committed
    fn confirm(&self, tag: ExperimentTag, proposals: &[CalibrationUpdate]) -> Approval;
}

impl<F> ConfirmationPort for F
where
    F: Fn(ExperimentTag, &[CalibrationUpdate]) -> Approval,
{
    fn confirm(&self, tag: ExperimentTag, proposals: &[CalibrationUpdate]) -> Approval {
        self(tag, proposals)
    }
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ConfirmationPort for AutoApprove {
    fn confirm(&self, _tag: ExperimentTag, _proposals: &[CalibrationUpdate]) -> Approval {
        Approval::All
    }
}

/// Approves nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl ConfirmationPort for DenyAll {
    fn confirm(&self, _tag: ExperimentTag, _proposals: &[CalibrationUpdate]) -> Approval {
        Approval::None
    }
}

/// Approves a fixed set of elements
#[derive(Debug, Clone, Default)]
pub struct ApproveElements(pub BTreeSet<ElementId>);

impl ApproveElements {
    /// Create from elements
    pub fn new<I: IntoIterator<Item = ElementId>>(elements: I) -> Self {
        Self(elements.into_iter().collect())
    }
}

impl ConfirmationPort for ApproveElements {
    fn confirm(&self, _tag: ExperimentTag, _proposals: &[CalibrationUpdate]) -> Approval {
        Approval::Only(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::ParameterChange;

    #[test]
    fn test_ports() {
        let q0 = ElementId::Qubit(0);
        let q1 = ElementId::Qubit(1);
        let proposals = vec![CalibrationUpdate::new(q0, ParameterChange::PiAmp(0.1))];

        assert!(AutoApprove.confirm(ExperimentTag::PowerRabi, &proposals).approves(q0));
        assert!(!DenyAll.confirm(ExperimentTag::PowerRabi, &proposals).approves(q0));

        let only = ApproveElements::new([q1]).confirm(ExperimentTag::PowerRabi, &proposals);
        assert!(only.approves(q1));
        assert!(!only.approves(q0));
    }

    #[test]
    fn test_closure_port() {
        let port = |tag: ExperimentTag, proposals: &[CalibrationUpdate]| {
            if tag.is_calibration() || proposals.len() > 3 {
                Approval::None
            } else {
                Approval::All
            }
        };
        assert_eq!(port.confirm(ExperimentTag::Ramsey, &[]), Approval::All);
        assert_eq!(port.confirm(ExperimentTag::DragCali, &[]), Approval::None);
    }
}
