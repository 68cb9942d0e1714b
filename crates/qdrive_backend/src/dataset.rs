//! Labeled multi-dimensional dataset
//!
//! Gantree: L3_Backend → Dataset
//!
//! One variable per measured element, named after the element, with layout
//! `[mixer(2), state, sample]` for averaged acquisition and
//! `[mixer(2), state, sample, shot]` per shot. The sweep axis of element
//! `q0` is stored as coordinate `q0_x`.

use chrono::{DateTime, Utc};
use qdrive_core::{AcquisitionMode, ElementId, ExperimentTag, IqPoint, QdriveError, QdriveResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata attached to every dataset
/// Gantree: DatasetMetadata // 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Experiment kind
    pub tag: ExperimentTag,
    /// Capture time
    pub capture_time: DateTime<Utc>,
    /// Acquisition method
    pub acquisition: AcquisitionMode,
    /// Averages or shots
    pub averaging: u32,
    /// Calibration constants at capture time, keyed "{element}.{name}"
    #[serde(default)]
    pub calibration: BTreeMap<String, f64>,
    /// Free-form attributes
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl DatasetMetadata {
    /// Metadata stamped now
    pub fn new(tag: ExperimentTag, acquisition: AcquisitionMode, averaging: u32) -> Self {
        Self {
            tag,
            capture_time: Utc::now(),
            acquisition,
            averaging,
            calibration: BTreeMap::new(),
            attrs: BTreeMap::new(),
        }
    }
}

/// One measured variable
/// Gantree: DataVariable // 측정 변수
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawVariable")]
pub struct DataVariable {
    /// Dimension names
    pub dims: Vec<String>,
    /// Dimension sizes
    pub shape: Vec<usize>,
    /// Row-major values
    #[serde(serialize_with = "samples::serialize")]
    pub values: Vec<f64>,
}

/// On-disk form of a variable, validated through `DataVariable::new`
#[derive(Deserialize)]
struct RawVariable {
    dims: Vec<String>,
    shape: Vec<usize>,
    #[serde(deserialize_with = "samples::deserialize")]
    values: Vec<f64>,
}

impl TryFrom<RawVariable> for DataVariable {
    type Error = QdriveError;

    fn try_from(raw: RawVariable) -> QdriveResult<Self> {
        Self::new(raw.dims, raw.shape, raw.values)
    }
}

// ============================================================================
// Sample Encoding
// ============================================================================

/// JSON has no NaN or infinity; non-finite samples are written as the
/// strings "NaN", "inf" and "-inf".
mod samples {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Sample {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in values {
            if v.is_finite() {
                seq.serialize_element(v)?;
            } else if v.is_nan() {
                seq.serialize_element("NaN")?;
            } else if *v > 0.0 {
                seq.serialize_element("inf")?;
            } else {
                seq.serialize_element("-inf")?;
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let raw = Vec::<Sample>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|s| match s {
                Sample::Number(v) => Ok(v),
                Sample::Text(t) => match t.as_str() {
                    "NaN" => Ok(f64::NAN),
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    other => Err(serde::de::Error::custom(format!(
                        "unknown sample '{}'",
                        other
                    ))),
                },
            })
            .collect()
    }
}

impl DataVariable {
    /// Create with shape validation
    pub fn new(dims: Vec<String>, shape: Vec<usize>, values: Vec<f64>) -> QdriveResult<Self> {
        if dims.len() != shape.len() {
            return Err(QdriveError::DatasetError(format!(
                "{} dims for {} axes",
                dims.len(),
                shape.len()
            )));
        }
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(QdriveError::DatasetError(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self { dims, shape, values })
    }

    /// Averaged IQ variable from per-state (I, Q) traces
    pub fn averaged(axis: &str, traces: &[(Vec<f64>, Vec<f64>)]) -> QdriveResult<Self> {
        let states = traces.len();
        let points = traces.first().map(|t| t.0.len()).unwrap_or(0);
        let mut values = vec![0.0; 2 * states * points];
        for (s, (i, q)) in traces.iter().enumerate() {
            if i.len() != points || q.len() != points {
                return Err(QdriveError::DatasetError(
                    "traces have different lengths".to_string(),
                ));
            }
            for n in 0..points {
                values[s * points + n] = i[n];
                values[(states + s) * points + n] = q[n];
            }
        }
        Self::new(
            vec!["mixer".into(), "state".into(), axis.to_string()],
            vec![2, states, points],
            values,
        )
    }

    /// Check if the variable holds per-shot data
    pub fn is_per_shot(&self) -> bool {
        self.shape.len() == 4
    }

    /// Number of prepared-state traces
    pub fn states(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(0)
    }

    /// Number of sweep samples
    pub fn points(&self) -> usize {
        self.shape.get(2).copied().unwrap_or(0)
    }

    /// Number of shots per sample (1 when averaged)
    pub fn shots_per_point(&self) -> usize {
        self.shape.get(3).copied().unwrap_or(1)
    }

    fn check_iq_layout(&self) -> QdriveResult<()> {
        if self.shape.len() < 3 || self.shape[0] != 2 {
            return Err(QdriveError::DatasetError(format!(
                "expected [mixer(2), state, sample, ...] layout, got {:?}",
                self.shape
            )));
        }
        Ok(())
    }

    fn index(&self, mixer: usize, state: usize, point: usize, shot: usize) -> usize {
        let (s, n, m) = (self.states(), self.points(), self.shots_per_point());
        ((mixer * s + state) * n + point) * m + shot
    }

    /// (I, Q) trace of one state, averaging shots when per-shot
    /// Gantree: trace(state) -> (I, Q) // 트레이스
    pub fn trace(&self, state: usize) -> QdriveResult<(Vec<f64>, Vec<f64>)> {
        self.check_iq_layout()?;
        if state >= self.states() {
            return Err(QdriveError::DatasetError(format!(
                "state {} out of {}",
                state,
                self.states()
            )));
        }
        let m = self.shots_per_point();
        let mean = |mixer: usize, point: usize| -> f64 {
            (0..m)
                .map(|k| self.values[self.index(mixer, state, point, k)])
                .sum::<f64>()
                / m as f64
        };
        let i = (0..self.points()).map(|n| mean(0, n)).collect();
        let q = (0..self.points()).map(|n| mean(1, n)).collect();
        Ok((i, q))
    }

    /// Individual shots of one state at one sample
    pub fn shots(&self, state: usize, point: usize) -> QdriveResult<Vec<IqPoint>> {
        self.check_iq_layout()?;
        if !self.is_per_shot() {
            return Err(QdriveError::DatasetError(
                "variable holds averaged data".to_string(),
            ));
        }
        if state >= self.states() || point >= self.points() {
            return Err(QdriveError::DatasetError(format!(
                "state {} / sample {} out of range",
                state, point
            )));
        }
        Ok((0..self.shots_per_point())
            .map(|k| {
                IqPoint::new(
                    self.values[self.index(0, state, point, k)],
                    self.values[self.index(1, state, point, k)],
                )
            })
            .collect())
    }
}

/// Labeled dataset
/// Gantree: Dataset // 데이터셋
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct Dataset {
    /// Measured variables by name
    pub variables: BTreeMap<String, DataVariable>,
    /// Coordinate axes by name
    pub coords: BTreeMap<String, Vec<f64>>,
    /// Metadata
    pub metadata: DatasetMetadata,
}

#[derive(Deserialize)]
struct RawDataset {
    variables: BTreeMap<String, DataVariable>,
    coords: BTreeMap<String, Vec<f64>>,
    metadata: DatasetMetadata,
}

impl TryFrom<RawDataset> for Dataset {
    type Error = QdriveError;

    fn try_from(raw: RawDataset) -> QdriveResult<Self> {
        let dataset = Dataset {
            variables: raw.variables,
            coords: raw.coords,
            metadata: raw.metadata,
        };
        dataset.check_axes()?;
        Ok(dataset)
    }
}

impl Dataset {
    /// Empty dataset
    pub fn new(metadata: DatasetMetadata) -> Self {
        Self {
            variables: BTreeMap::new(),
            coords: BTreeMap::new(),
            metadata,
        }
    }

    /// Coordinate name of an element's sweep axis
    pub fn axis_name(element: ElementId) -> String {
        format!("{}_x", element)
    }

    /// Insert the variable and sweep axis of an element
    pub fn insert_element(
        &mut self,
        element: ElementId,
        variable: DataVariable,
        axis: Vec<f64>,
    ) -> QdriveResult<()> {
        if variable.points() != axis.len() {
            return Err(QdriveError::DatasetError(format!(
                "{}: {} samples but axis has {}",
                element,
                variable.points(),
                axis.len()
            )));
        }
        self.coords.insert(Self::axis_name(element), axis);
        self.variables.insert(element.to_string(), variable);
        Ok(())
    }

    /// Check every IQ variable against its sweep axis
    /// Gantree: check_axes() -> Result // 축 길이 검사
    pub fn check_axes(&self) -> QdriveResult<()> {
        for (name, variable) in &self.variables {
            variable.check_iq_layout()?;
            if let Some(axis) = self.coords.get(&format!("{}_x", name)) {
                if axis.len() != variable.points() {
                    return Err(QdriveError::DatasetError(format!(
                        "{}: {} samples but axis has {}",
                        name,
                        variable.points(),
                        axis.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Elements with a measured variable, in element order
    pub fn measured_elements(&self) -> Vec<ElementId> {
        let mut elements: Vec<ElementId> = self
            .variables
            .keys()
            .filter_map(|name| ElementId::parse(name).ok())
            .collect();
        elements.sort();
        elements
    }

    /// Variable of an element
    pub fn variable(&self, element: ElementId) -> QdriveResult<&DataVariable> {
        self.variables
            .get(&element.to_string())
            .ok_or_else(|| QdriveError::DatasetError(format!("no variable for {}", element)))
    }

    /// Sweep axis of an element
    pub fn axis(&self, element: ElementId) -> QdriveResult<&[f64]> {
        self.coords
            .get(&Self::axis_name(element))
            .map(Vec::as_slice)
            .ok_or_else(|| QdriveError::DatasetError(format!("no sweep axis for {}", element)))
    }
}

// ============================================================================
// Tests
// ============================================================================
