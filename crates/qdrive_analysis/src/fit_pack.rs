//! Fit pack
//!
//! Gantree: L4_Analysis → FitPack
//!
//! Named scalars and arrays produced for one element by an analysis routine.

use qdrive_core::{QdriveError, QdriveResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One fit-pack entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FitValue {
    /// Single value
    Scalar(f64),
    /// Series
    Array(Vec<f64>),
}

/// Named analysis outputs of one element
/// Gantree: FitPack // 결과 묶음
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FitPack {
    values: BTreeMap<String, FitValue>,
}

impl FitPack {
    /// Empty pack
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style scalar insert
    pub fn with_scalar(mut self, name: &str, value: f64) -> Self {
        self.insert_scalar(name, value);
        self
    }

    /// Insert a scalar
    pub fn insert_scalar(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), FitValue::Scalar(value));
    }

    /// Insert an array
    pub fn insert_array(&mut self, name: &str, values: Vec<f64>) {
        self.values.insert(name.to_string(), FitValue::Array(values));
    }

    /// Scalar by name
    pub fn scalar(&self, name: &str) -> QdriveResult<f64> {
        match self.values.get(name) {
            Some(FitValue::Scalar(v)) => Ok(*v),
            Some(FitValue::Array(_)) => Err(QdriveError::DatasetError(format!(
                "fit pack entry '{}' is an array",
                name
            ))),
            None => Err(QdriveError::DatasetError(format!(
                "fit pack has no '{}'",
                name
            ))),
        }
    }

    /// Array by name
    pub fn array(&self, name: &str) -> QdriveResult<&[f64]> {
        match self.values.get(name) {
            Some(FitValue::Array(v)) => Ok(v),
            _ => Err(QdriveError::DatasetError(format!(
                "fit pack has no array '{}'",
                name
            ))),
        }
    }

    /// Check if an entry exists
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Scalar entries only
    pub fn scalars(&self) -> BTreeMap<String, f64> {
        self.values
            .iter()
            .filter_map(|(k, v)| match v {
                FitValue::Scalar(s) => Some((k.clone(), *s)),
                FitValue::Array(_) => None,
            })
            .collect()
    }

    /// Iterate entries by name
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FitValue)> {
        self.values.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_and_array() {
        let mut pack = FitPack::new().with_scalar("t1", 30e-6);
        pack.insert_array("fit_y", vec![1.0, 0.5]);

        assert_eq!(pack.scalar("t1").unwrap(), 30e-6);
        assert!(pack.scalar("fit_y").is_err());
        assert_eq!(pack.array("fit_y").unwrap(), &[1.0, 0.5]);
        assert!(pack.array("t1").is_err());
        assert_eq!(pack.scalars().len(), 1);
    }

    #[test]
    fn test_json_shape() {
        let pack = FitPack::new().with_scalar("freq", 5e6);
        let json = serde_json::to_value(&pack).unwrap();
        assert_eq!(json, serde_json::json!({"freq": 5e6}));
        let back: FitPack = serde_json::from_value(json).unwrap();
        assert_eq!(back, pack);
    }
}
