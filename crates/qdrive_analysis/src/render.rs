//! Render artifacts
//!
//! Gantree: L4_Analysis → Render
//!
//! Figures are described, not drawn: a `Rendering` carries the series and
//! annotations a plotting front end needs and is persisted as JSON next to
//! the dataset.

use crate::fit_pack::{FitPack, FitValue};
use qdrive_backend::DataVariable;
use qdrive_core::persist;
use qdrive_core::{ElementId, ExperimentTag, IqPoint, QdriveResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Rendering path taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderKind {
    /// Data with fit overlay
    Fitted,
    /// Raw data only, after an analysis failure
    Raw,
}

/// Figure description of one element
/// Gantree: Rendering // 그림 산출물
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rendering {
    /// Experiment kind
    pub tag: ExperimentTag,
    /// Element
    pub element: ElementId,
    /// Rendering path
    pub kind: RenderKind,
    /// Figure title
    pub title: String,
    /// Abscissa
    pub x: Vec<f64>,
    /// Plotted series by label
    pub series: BTreeMap<String, Vec<f64>>,
    /// Annotated values
    pub annotations: BTreeMap<String, f64>,
    /// Free-form note (failure reason on the raw path)
    pub note: Option<String>,
}

impl Rendering {
    /// Artifact file name, `{element}_{tag}.json`
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.element, self.tag)
    }

    /// Persist into `dir`
    pub fn save(&self, dir: &Path) -> QdriveResult<PathBuf> {
        let path = dir.join(self.file_name());
        persist::write_json(&path, self)?;
        Ok(path)
    }
}

/// Inputs available to a render function
pub struct RenderInput<'a> {
    /// Experiment kind
    pub tag: ExperimentTag,
    /// Element
    pub element: ElementId,
    /// Raw variable
    pub variable: &'a DataVariable,
    /// Sweep axis
    pub axis: &'a [f64],
    /// Analysis output
    pub pack: &'a FitPack,
}

/// Render function signature
pub type RenderFn = fn(&RenderInput<'_>) -> Rendering;

fn base(input: &RenderInput<'_>, kind: RenderKind, title: String) -> Rendering {
    Rendering {
        tag: input.tag,
        element: input.element,
        kind,
        title,
        x: input.axis.to_vec(),
        series: BTreeMap::new(),
        annotations: BTreeMap::new(),
        note: None,
    }
}

/// Reduced trace with fit overlay; pack arrays become series, scalars annotations
pub fn render_trace(input: &RenderInput<'_>) -> Rendering {
    let mut r = base(
        input,
        RenderKind::Fitted,
        format!("{} {}", input.element, input.tag),
    );
    if let Ok(x) = input.pack.array("x") {
        r.x = x.to_vec();
    }
    for (name, value) in input.pack.iter() {
        match value {
            FitValue::Array(v) if name != "x" => {
                r.series.insert(name.clone(), v.clone());
            }
            FitValue::Scalar(s) => {
                r.annotations.insert(name.clone(), *s);
            }
            _ => {}
        }
    }
    r
}

/// IQ-plane scatter of prepared states with fitted centers annotated
pub fn render_iq_scatter(input: &RenderInput<'_>) -> Rendering {
    let mut r = base(
        input,
        RenderKind::Fitted,
        format!("{} {} IQ plane", input.element, input.tag),
    );
    r.x.clear();
    for state in 0..input.variable.states() {
        let points: Vec<_> = if input.variable.is_per_shot() {
            (0..input.variable.points())
                .filter_map(|p| input.variable.shots(state, p).ok())
                .flatten()
                .collect()
        } else {
            match input.variable.trace(state) {
                Ok((i, q)) => i
                    .into_iter()
                    .zip(q)
                    .map(|(i, q)| IqPoint::new(i, q))
                    .collect(),
                Err(_) => Vec::new(),
            }
        };
        r.series
            .insert(format!("I_{}", state), points.iter().map(|p| p.i).collect());
        r.series
            .insert(format!("Q_{}", state), points.iter().map(|p| p.q).collect());
    }
    r.annotations = input.pack.scalars();
    r
}

/// Raw I/Q traces per state, used when analysis failed
/// Gantree: render_raw(variable,reason) -> Rendering // 원시 데이터 그림
pub fn render_raw(
    tag: ExperimentTag,
    element: ElementId,
    variable: &DataVariable,
    axis: &[f64],
    reason: &str,
) -> Rendering {
    let mut series = BTreeMap::new();
    for state in 0..variable.states() {
        if let Ok((i, q)) = variable.trace(state) {
            series.insert(format!("I_{}", state), i);
            series.insert(format!("Q_{}", state), q);
        }
    }
    Rendering {
        tag,
        element,
        kind: RenderKind::Raw,
        title: format!("{} {} (raw)", element, tag),
        x: axis.to_vec(),
        series,
        annotations: BTreeMap::new(),
        note: Some(reason.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn variable() -> DataVariable {
        DataVariable::averaged(
            "q0_x",
            &[
                (vec![1.0, 2.0], vec![0.0, 0.0]),
                (vec![3.0, 4.0], vec![1.0, 1.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_render_trace_splits_pack() {
        let var = variable();
        let mut pack = FitPack::new().with_scalar("t1", 2e-5);
        pack.insert_array("data", vec![0.1, 0.2]);
        let input = RenderInput {
            tag: ExperimentTag::EnergyRelaxation,
            element: ElementId::Qubit(0),
            variable: &var,
            axis: &[0.0, 1e-6],
            pack: &pack,
        };
        let r = render_trace(&input);
        assert_eq!(r.kind, RenderKind::Fitted);
        assert_eq!(r.series["data"], vec![0.1, 0.2]);
        assert_eq!(r.annotations["t1"], 2e-5);
        assert_eq!(r.file_name(), "q0_T1.json");
    }

    #[test]
    fn test_render_raw() {
        let var = variable();
        let r = render_raw(
            ExperimentTag::Ramsey,
            ElementId::Qubit(0),
            &var,
            &[0.0, 1.0],
            "no convergence",
        );
        assert_eq!(r.kind, RenderKind::Raw);
        assert_eq!(r.series.len(), 4);
        assert_eq!(r.series["I_1"], vec![3.0, 4.0]);
        assert_eq!(r.note.as_deref(), Some("no convergence"));
    }

    #[test]
    fn test_save() {
        let dir = tempfile::tempdir().unwrap();
        let var = variable();
        let r = render_raw(ExperimentTag::PowerRabi, ElementId::Qubit(0), &var, &[0.0, 1.0], "x");
        let path = r.save(dir.path()).unwrap();
        let back: Rendering = persist::read_json(&path).unwrap();
        assert_eq!(back, r);
    }
}
