//! Analysis registry
//!
//! Gantree: L4_Analysis → AnalysisRegistry
//!
//! Explicit table from experiment tag to its `{analyze, render}` pair,
//! checked for completeness when built so that an unknown or missing tag
//! fails at construction instead of at first use.

use crate::render::{render_iq_scatter, render_trace, RenderFn};
use crate::routines::{self, AnalyzeFn};
use qdrive_core::{ExperimentTag, QdriveError, QdriveResult};
use std::collections::BTreeMap;

/// Analyze/render pair of one experiment kind
/// Gantree: AnalysisRoutine // {analyze, render}
#[derive(Clone, Copy)]
pub struct AnalysisRoutine {
    /// Raw variable → fit pack
    pub analyze: AnalyzeFn,
    /// Fit pack → figure description
    pub render: RenderFn,
}

impl AnalysisRoutine {
    /// Create routine
    pub fn new(analyze: AnalyzeFn, render: RenderFn) -> Self {
        Self { analyze, render }
    }
}

/// Tag-keyed routine table covering every experiment tag
/// Gantree: AnalysisRegistry // 태그 → 루틴 표
#[derive(Clone)]
pub struct AnalysisRegistry {
    routines: BTreeMap<ExperimentTag, AnalysisRoutine>,
}

impl AnalysisRegistry {
    /// Routine set shipped with the crate
    /// Gantree: standard() -> Registry // 표준 표
    pub fn standard() -> Self {
        use ExperimentTag::*;
        let entries = [
            (CavitySearch, routines::analyze_cavity_search as AnalyzeFn, render_trace as RenderFn),
            (IqReference, routines::analyze_iq_reference, render_iq_scatter),
            (PowerRabi, routines::analyze_power_rabi, render_trace),
            (TimeRabi, routines::analyze_time_rabi, render_trace),
            (Ramsey, routines::analyze_ramsey, render_trace),
            (SpinEcho, routines::analyze_spin_echo, render_trace),
            (EnergyRelaxation, routines::analyze_energy_relaxation, render_trace),
            (SingleShot, routines::analyze_single_shot, render_iq_scatter),
            (DriveFreqCali, routines::analyze_drive_freq_cali, render_trace),
            (ReadoutFreqCali, routines::analyze_readout_freq_cali, render_trace),
            (PiAmpCali, routines::analyze_pi_amp_cali, render_trace),
            (DragCali, routines::analyze_drag_cali, render_trace),
            (TwoTone, routines::analyze_two_tone, render_trace),
            (FluxCavity, routines::analyze_flux_cavity, render_trace),
            (FluxQubit, routines::analyze_flux_qubit, render_trace),
            (Cpmg, routines::analyze_cpmg, render_trace),
        ];
        Self {
            routines: entries
                .into_iter()
                .map(|(tag, analyze, render)| (tag, AnalysisRoutine::new(analyze, render)))
                .collect(),
        }
    }

    /// Build from tag names, requiring exactly one routine per known tag
    /// Gantree: from_entries(entries) -> Result<Registry> // 검증 생성
    pub fn from_entries<'a, I>(entries: I) -> QdriveResult<Self>
    where
        I: IntoIterator<Item = (&'a str, AnalysisRoutine)>,
    {
        let mut routines = BTreeMap::new();
        for (name, routine) in entries {
            let tag = ExperimentTag::parse(name)?;
            if routines.insert(tag, routine).is_some() {
                return Err(QdriveError::ConfigError(format!(
                    "analysis tag '{}' registered twice",
                    name
                )));
            }
        }

        let missing: Vec<&str> = ExperimentTag::ALL
            .iter()
            .filter(|t| !routines.contains_key(*t))
            .map(|t| t.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(QdriveError::ConfigError(format!(
                "no analysis routine for {}",
                missing.join(", ")
            )));
        }
        Ok(Self { routines })
    }

    /// Replace the routine of one tag
    pub fn with_routine(mut self, tag: ExperimentTag, routine: AnalysisRoutine) -> Self {
        self.routines.insert(tag, routine);
        self
    }

    /// Routine of a tag
    pub fn get(&self, tag: ExperimentTag) -> QdriveResult<&AnalysisRoutine> {
        self.routines
            .get(&tag)
            .ok_or_else(|| QdriveError::UnknownAnalysisTag(tag.to_string()))
    }

    /// Registered tags
    pub fn tags(&self) -> Vec<ExperimentTag> {
        self.routines.keys().copied().collect()
    }
}

impl Default for AnalysisRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn all_entries() -> Vec<(&'static str, AnalysisRoutine)> {
        let standard = AnalysisRegistry::standard();
        ExperimentTag::ALL
            .iter()
            .map(|t| (t.as_str(), *standard.get(*t).unwrap()))
            .collect()
    }

    #[test]
    fn test_standard_is_exhaustive() {
        let registry = AnalysisRegistry::standard();
        assert_eq!(registry.tags().len(), ExperimentTag::ALL.len());
        for tag in ExperimentTag::ALL {
            assert!(registry.get(tag).is_ok());
        }
    }

    #[test]
    fn test_from_entries_complete() {
        assert!(AnalysisRegistry::from_entries(all_entries()).is_ok());
    }

    #[test]
    fn test_unknown_tag_rejected_at_construction() {
        let mut entries = all_entries();
        let routine = entries[0].1;
        entries.push(("RabiChevron", routine));
        let err = AnalysisRegistry::from_entries(entries).err().unwrap();
        assert!(matches!(err, QdriveError::UnknownAnalysisTag(ref t) if t == "RabiChevron"));
    }

    #[test]
    fn test_missing_tag_rejected() {
        let entries: Vec<_> = all_entries()
            .into_iter()
            .filter(|(name, _)| *name != "T1")
            .collect();
        let err = AnalysisRegistry::from_entries(entries).err().unwrap();
        assert!(err.to_string().contains("T1"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut entries = all_entries();
        let dup = entries[1];
        entries.push(dup);
        assert!(AnalysisRegistry::from_entries(entries).is_err());
    }
}
