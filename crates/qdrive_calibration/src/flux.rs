//! Flux bias table
//!
//! Gantree: L2_Calibration → FluxBiasTable
//!
//! Static bias per qubit and coupler. A qubit either sits at its sweet spot
//! or, when flagged, at a tune-away point.

use qdrive_core::{ElementId, QdriveError, QdriveResult, Volts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bias settings of one element
/// Gantree: FluxBias // 바이어스 설정
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FluxBias {
    /// Sweet-spot (or idle, for couplers) bias
    pub sweet_spot: Volts,

    /// Bias used when operating away from the sweet spot
    #[serde(default)]
    pub tune_away: Option<Volts>,

    /// Operate at the tune-away bias
    #[serde(default)]
    pub off_sweet_spot: bool,
}

impl FluxBias {
    /// Bias at the sweet spot
    pub fn at(sweet_spot: Volts) -> Self {
        Self {
            sweet_spot,
            ..Default::default()
        }
    }

    /// Bias the element should be parked at for measurements
    pub fn proper(&self) -> Volts {
        match (self.off_sweet_spot, self.tune_away) {
            (true, Some(v)) => v,
            _ => self.sweet_spot,
        }
    }
}

/// Bias table for all flux-tunable elements
/// Gantree: FluxBiasTable // 플럭스 바이어스 표
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FluxBiasTable {
    biases: BTreeMap<ElementId, FluxBias>,
}

impl FluxBiasTable {
    /// Table with zero bias for every listed element
    pub fn zeroed<I: IntoIterator<Item = ElementId>>(elements: I) -> Self {
        Self {
            biases: elements.into_iter().map(|e| (e, FluxBias::default())).collect(),
        }
    }

    /// Bias entry of an element
    pub fn get(&self, element: ElementId) -> Option<&FluxBias> {
        self.biases.get(&element)
    }

    /// Replace the bias entry of an element
    pub fn set(&mut self, element: ElementId, bias: FluxBias) {
        self.biases.insert(element, bias);
    }

    /// Update the sweet spot of an element
    pub fn set_sweet_spot(&mut self, element: ElementId, volts: Volts) {
        self.biases.entry(element).or_default().sweet_spot = volts;
    }

    /// Proper operating bias of an element
    /// Gantree: proper_bias(element) -> Volts // 적정 바이어스
    pub fn proper_bias(&self, element: ElementId) -> QdriveResult<Volts> {
        self.biases
            .get(&element)
            .map(FluxBias::proper)
            .ok_or(QdriveError::UnknownElement {
                element: element.to_string(),
            })
    }

    /// Idle biases of every coupler
    pub fn coupler_biases(&self) -> Vec<(ElementId, Volts)> {
        self.biases
            .iter()
            .filter(|(e, _)| e.is_coupler())
            .map(|(e, b)| (*e, b.sweet_spot))
            .collect()
    }

    /// Reset every entry to zero bias at the sweet spot
    pub fn zero_all(&mut self) {
        for bias in self.biases.values_mut() {
            *bias = FluxBias::default();
        }
    }

    /// Iterate entries in element order
    pub fn iter(&self) -> impl Iterator<Item = (&ElementId, &FluxBias)> {
        self.biases.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.biases.len()
    }

    /// Check if table is empty
    pub fn is_empty(&self) -> bool {
        self.biases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proper_bias() {
        let mut table = FluxBiasTable::zeroed([ElementId::Qubit(0), ElementId::Coupler(0)]);
        table.set_sweet_spot(ElementId::Qubit(0), 0.12);
        assert_eq!(table.proper_bias(ElementId::Qubit(0)).unwrap(), 0.12);

        table.set(
            ElementId::Qubit(0),
            FluxBias {
                sweet_spot: 0.12,
                tune_away: Some(0.2),
                off_sweet_spot: true,
            },
        );
        assert_eq!(table.proper_bias(ElementId::Qubit(0)).unwrap(), 0.2);
        assert!(table.proper_bias(ElementId::Qubit(5)).is_err());
    }

    #[test]
    fn test_off_sweet_spot_without_tune_away() {
        let bias = FluxBias {
            sweet_spot: 0.1,
            tune_away: None,
            off_sweet_spot: true,
        };
        assert_eq!(bias.proper(), 0.1);
    }

    #[test]
    fn test_coupler_biases() {
        let mut table = FluxBiasTable::zeroed([
            ElementId::Qubit(0),
            ElementId::Coupler(0),
            ElementId::Coupler(1),
        ]);
        table.set_sweet_spot(ElementId::Coupler(1), -0.3);
        let couplers = table.coupler_biases();
        assert_eq!(couplers.len(), 2);
        assert_eq!(couplers[1], (ElementId::Coupler(1), -0.3));
    }

    #[test]
    fn test_zero_all() {
        let mut table = FluxBiasTable::zeroed([ElementId::Qubit(0), ElementId::Coupler(0)]);
        table.set_sweet_spot(ElementId::Qubit(0), 0.4);
        table.set_sweet_spot(ElementId::Coupler(0), -0.1);
        table.zero_all();
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|(_, b)| b.proper() == 0.0));
    }
}
