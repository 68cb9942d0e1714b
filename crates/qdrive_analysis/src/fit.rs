//! Fit engine boundary
//!
//! Gantree: L4_Analysis → FitEngine
//!
//! Curve fitting is delegated to an external engine: model tag in, parameter
//! record out. Parameter names per model:
//!
//! | model | formula | parameters |
//! |---|---|---|
//! | `Lorentzian` | `A / (1 + ((x - x0) / w)^2) + c` | `amplitude`, `center`, `width`, `offset` |
//! | `Cosine` | `A cos(2π f x + φ) + c` | `amplitude`, `freq`, `phase`, `offset` |
//! | `DampedCosine` | `A e^(-x/τ) cos(2π f x + φ) + c` | `amplitude`, `freq`, `phase`, `tau`, `offset` |
//! | `ExponentialDecay` | `A e^(-x/τ) + c` | `amplitude`, `tau`, `offset` |
//! | `Linear` | `a x + b` | `slope`, `intercept` |
//! | `Parabola` | `a x^2 + b x + c` | `curvature`, `slope`, `intercept` |

use qdrive_core::{QdriveError, QdriveResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fit model tag
/// Gantree: FitModel // 피팅 모델
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FitModel {
    /// Resonance line
    Lorentzian,
    /// Undamped oscillation
    Cosine,
    /// Decaying oscillation
    DampedCosine,
    /// Exponential relaxation
    ExponentialDecay,
    /// Straight line
    Linear,
    /// Quadratic around an extremum
    Parabola,
}

impl FitModel {
    /// Parameters the engine must return
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            FitModel::Lorentzian => &["amplitude", "center", "width", "offset"],
            FitModel::Cosine => &["amplitude", "freq", "phase", "offset"],
            FitModel::DampedCosine => &["amplitude", "freq", "phase", "tau", "offset"],
            FitModel::ExponentialDecay => &["amplitude", "tau", "offset"],
            FitModel::Linear => &["slope", "intercept"],
            FitModel::Parabola => &["curvature", "slope", "intercept"],
        }
    }

    /// Evaluate the model at `x`
    pub fn eval(&self, record: &FitRecord, x: f64) -> QdriveResult<f64> {
        let p = |name: &str| record.param(name);
        let two_pi = 2.0 * std::f64::consts::PI;
        Ok(match self {
            FitModel::Lorentzian => {
                let u = (x - p("center")?) / p("width")?;
                p("amplitude")? / (1.0 + u * u) + p("offset")?
            }
            FitModel::Cosine => {
                p("amplitude")? * (two_pi * p("freq")? * x + p("phase")?).cos() + p("offset")?
            }
            FitModel::DampedCosine => {
                p("amplitude")?
                    * (-x / p("tau")?).exp()
                    * (two_pi * p("freq")? * x + p("phase")?).cos()
                    + p("offset")?
            }
            FitModel::ExponentialDecay => {
                p("amplitude")? * (-x / p("tau")?).exp() + p("offset")?
            }
            FitModel::Linear => p("slope")? * x + p("intercept")?,
            FitModel::Parabola => (p("curvature")? * x + p("slope")?) * x + p("intercept")?,
        })
    }
}

impl fmt::Display for FitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Samples handed to the fit engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitInput {
    /// Abscissa
    pub x: Vec<f64>,
    /// Ordinate
    pub y: Vec<f64>,
}

impl FitInput {
    /// Create with length check
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> QdriveResult<Self> {
        if x.len() != y.len() {
            return Err(QdriveError::DatasetError(format!(
                "fit input has {} x and {} y values",
                x.len(),
                y.len()
            )));
        }
        Ok(Self { x, y })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Parameter record returned by the fit engine
/// Gantree: FitRecord // 피팅 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    /// Fitted model
    pub model: FitModel,
    /// Named parameters
    pub params: BTreeMap<String, f64>,
}

impl FitRecord {
    /// Create from name/value pairs
    pub fn new<'a, I: IntoIterator<Item = (&'a str, f64)>>(model: FitModel, params: I) -> Self {
        Self {
            model,
            params: params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Parameter value; a missing or non-finite value counts as non-convergence
    pub fn param(&self, name: &str) -> QdriveResult<f64> {
        match self.params.get(name) {
            Some(v) if v.is_finite() => Ok(*v),
            Some(v) => Err(QdriveError::FitConvergence {
                model: self.model.to_string(),
                reason: format!("{} = {}", name, v),
            }),
            None => Err(QdriveError::FitConvergence {
                model: self.model.to_string(),
                reason: format!("missing parameter '{}'", name),
            }),
        }
    }

    /// Evaluate the fitted curve on a grid
    pub fn curve(&self, x: &[f64]) -> QdriveResult<Vec<f64>> {
        x.iter().map(|&x| self.model.eval(self, x)).collect()
    }
}

/// External curve fitter
/// Gantree: FitEngine // 피팅 엔진 trait
///
/// Pure: the same input always gives the same record. Fails with
/// `QdriveError::FitConvergence`.
pub trait FitEngine: Send + Sync {
    /// Fit `model` to the samples
    fn fit(&self, input: &FitInput, model: FitModel) -> QdriveResult<FitRecord>;
}

impl<F> FitEngine for F
where
    F: Fn(&FitInput, FitModel) -> QdriveResult<FitRecord> + Send + Sync,
{
    fn fit(&self, input: &FitInput, model: FitModel) -> QdriveResult<FitRecord> {
        self(input, model)
    }
}

// ============================================================================
// Tests
// ============================================================================
