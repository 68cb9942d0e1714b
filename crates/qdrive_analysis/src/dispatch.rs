//! Analysis dispatch
//!
//! Gantree: L4_Analysis → AnalysisDispatch
//!
//! Runs the registered routine of a dataset's tag over every measured
//! element. Each element is analyzed on its own: a failure is logged and
//! replaced by the raw rendering, and the remaining elements carry on.

use crate::fit::FitEngine;
use crate::fit_pack::FitPack;
use crate::outlier::OutlierFilter;
use crate::registry::AnalysisRegistry;
use crate::render::{render_raw, RenderInput, Rendering};
use crate::routines::AnalysisContext;
use qdrive_backend::Dataset;
use qdrive_calibration::CalibrationSnapshot;
use qdrive_core::{ElementId, ExperimentTag, QdriveError, QdriveResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Outcomes
// ============================================================================

/// Analysis outcome of one element
/// Gantree: ElementOutcome // 원소별 결과
#[derive(Debug, Clone)]
pub enum ElementOutcome {
    /// Routine succeeded
    Fitted {
        /// Fit results
        pack: FitPack,
        /// Fitted figure
        rendering: Rendering,
        /// Persisted figure path
        artifact: Option<PathBuf>,
    },
    /// Routine failed; raw data was rendered instead
    Fallback {
        /// Failure cause
        error: QdriveError,
        /// Raw figure
        rendering: Rendering,
        /// Persisted figure path
        artifact: Option<PathBuf>,
    },
}

impl ElementOutcome {
    /// Fit pack when fitted
    pub fn pack(&self) -> Option<&FitPack> {
        match self {
            ElementOutcome::Fitted { pack, .. } => Some(pack),
            ElementOutcome::Fallback { .. } => None,
        }
    }

    /// Rendering of either path
    pub fn rendering(&self) -> &Rendering {
        match self {
            ElementOutcome::Fitted { rendering, .. } | ElementOutcome::Fallback { rendering, .. } => {
                rendering
            }
        }
    }

    /// Persisted artifact of either path
    pub fn artifact(&self) -> Option<&Path> {
        match self {
            ElementOutcome::Fitted { artifact, .. } | ElementOutcome::Fallback { artifact, .. } => {
                artifact.as_deref()
            }
        }
    }

    /// Check if the routine succeeded
    pub fn is_fitted(&self) -> bool {
        matches!(self, ElementOutcome::Fitted { .. })
    }
}

/// Outcomes of every measured element of one dataset
/// Gantree: DatasetAnalysis // fit_packs
#[derive(Debug, Clone)]
pub struct DatasetAnalysis {
    /// Dataset tag
    pub tag: ExperimentTag,
    /// Per-element outcome
    pub outcomes: BTreeMap<ElementId, ElementOutcome>,
}

impl DatasetAnalysis {
    /// Fit packs of the elements that succeeded
    pub fn fitted(&self) -> BTreeMap<ElementId, &FitPack> {
        self.outcomes
            .iter()
            .filter_map(|(e, o)| o.pack().map(|p| (*e, p)))
            .collect()
    }

    /// Elements that fell back, with their errors
    pub fn failures(&self) -> BTreeMap<ElementId, &QdriveError> {
        self.outcomes
            .iter()
            .filter_map(|(e, o)| match o {
                ElementOutcome::Fallback { error, .. } => Some((*e, error)),
                ElementOutcome::Fitted { .. } => None,
            })
            .collect()
    }
}

// ============================================================================
// AnalysisDispatch
// ============================================================================

/// Tag-keyed analysis runner
/// Gantree: AnalysisDispatch // 분석 디스패치
pub struct AnalysisDispatch {
    registry: AnalysisRegistry,
    fit_engine: Box<dyn FitEngine>,
    filter: OutlierFilter,
    artifact_dir: Option<PathBuf>,
}

impl AnalysisDispatch {
    /// Create with a registry and fit engine
    pub fn new<F: FitEngine + 'static>(registry: AnalysisRegistry, fit_engine: F) -> Self {
        Self {
            registry,
            fit_engine: Box::new(fit_engine),
            filter: OutlierFilter::default(),
            artifact_dir: None,
        }
    }

    /// Builder: outlier filter
    pub fn with_filter(mut self, filter: OutlierFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Builder: folder receiving rendering artifacts
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Registry in use
    pub fn registry(&self) -> &AnalysisRegistry {
        &self.registry
    }

    /// Analyze every measured element of a dataset
    /// Gantree: analyze_dataset(dataset,snapshot) -> DatasetAnalysis // 데이터셋 분석
    ///
    /// Per-element failures become `Fallback` outcomes. Only a missing
    /// routine or an artifact write failure aborts the pass.
    pub fn analyze_dataset(
        &self,
        dataset: &Dataset,
        snapshot: &CalibrationSnapshot,
    ) -> QdriveResult<DatasetAnalysis> {
        self.analyze_dataset_to(dataset, snapshot, self.artifact_dir.as_deref())
    }

    /// Analyze a dataset, writing artifacts into `artifact_dir` when given
    pub fn analyze_dataset_to(
        &self,
        dataset: &Dataset,
        snapshot: &CalibrationSnapshot,
        artifact_dir: Option<&Path>,
    ) -> QdriveResult<DatasetAnalysis> {
        self.analyze_dataset_with(dataset, snapshot, &self.filter, artifact_dir)
    }

    /// Analyze a dataset with an outlier filter overriding the dispatch's own
    /// Gantree: analyze_dataset_with(dataset,snapshot,filter,dir) // 필터 지정 분석
    pub fn analyze_dataset_with(
        &self,
        dataset: &Dataset,
        snapshot: &CalibrationSnapshot,
        filter: &OutlierFilter,
        artifact_dir: Option<&Path>,
    ) -> QdriveResult<DatasetAnalysis> {
        let tag = dataset.metadata.tag;
        let routine = self.registry.get(tag)?;
        let mut outcomes = BTreeMap::new();

        for element in dataset.measured_elements() {
            let variable = dataset.variable(element)?;
            let axis = dataset.axis(element)?;

            let analyzed = snapshot.reference_for(element).and_then(|reference| {
                let ctx = AnalysisContext {
                    tag,
                    element,
                    reference,
                    fit: self.fit_engine.as_ref(),
                    filter,
                    metadata: &dataset.metadata,
                    discriminator: snapshot.discriminators.model(element).ok(),
                };
                (routine.analyze)(variable, axis, &ctx)
            });

            let outcome = match analyzed {
                Ok(pack) => {
                    let rendering = (routine.render)(&RenderInput {
                        tag,
                        element,
                        variable,
                        axis,
                        pack: &pack,
                    });
                    let artifact = persist(&rendering, artifact_dir)?;
                    log::info!("{} {}: analysis done", tag, element);
                    ElementOutcome::Fitted {
                        pack,
                        rendering,
                        artifact,
                    }
                }
                Err(error) => {
                    log::warn!("{} {}: analysis failed, rendering raw data: {}", tag, element, error);
                    let rendering = render_raw(tag, element, variable, axis, &error.to_string());
                    let artifact = persist(&rendering, artifact_dir)?;
                    ElementOutcome::Fallback {
                        error,
                        rendering,
                        artifact,
                    }
                }
            };
            outcomes.insert(element, outcome);
        }

        Ok(DatasetAnalysis { tag, outcomes })
    }
}

fn persist(rendering: &Rendering, dir: Option<&Path>) -> QdriveResult<Option<PathBuf>> {
    match dir {
        Some(dir) => rendering.save(dir).map(Some),
        None => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================
