//! Sample grids
//!
//! Gantree: L5_Engine → SamplingFunction
//!
//! Per-element sweep grids: evenly spaced, geometrically spaced or fixed
//! step. Time grids are snapped to the sequencer resolution.

use qdrive_core::constants::lifecycle::TIME_RESOLUTION_S;
use qdrive_core::{QdriveError, QdriveResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid generator
/// Gantree: SamplingFunction // linspace / logspace / arange
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SamplingFunction {
    /// `points` evenly spaced samples, both ends included
    Linear {
        /// Number of samples
        points: usize,
    },
    /// `points` geometrically spaced samples, both ends included
    Logarithmic {
        /// Number of samples
        points: usize,
    },
    /// Samples `start, start + step, ...` below `end`
    FixedStep {
        /// Step between samples
        step: f64,
    },
}

impl SamplingFunction {
    /// Parse the conventional names `linspace`, `logspace`, `arange`
    ///
    /// `pts_or_step` is the point count for the first two and the step for
    /// `arange`.
    pub fn parse(name: &str, pts_or_step: f64) -> QdriveResult<Self> {
        let points = || -> QdriveResult<usize> {
            if pts_or_step.fract() != 0.0 || pts_or_step < 0.0 {
                return Err(QdriveError::ParameterValidation(format!(
                    "{} needs a whole point count, got {}",
                    name, pts_or_step
                )));
            }
            Ok(pts_or_step as usize)
        };
        match name {
            "linspace" => Ok(SamplingFunction::Linear { points: points()? }),
            "logspace" => Ok(SamplingFunction::Logarithmic { points: points()? }),
            "arange" => Ok(SamplingFunction::FixedStep { step: pts_or_step }),
            other => Err(QdriveError::ParameterValidation(format!(
                "unknown sampling function '{}' (expected linspace, logspace or arange)",
                other
            ))),
        }
    }

    /// Grid over `[start, end]`
    /// Gantree: samples(start,end) -> Vec<f64> // 격자 생성
    pub fn samples(&self, start: f64, end: f64) -> QdriveResult<Vec<f64>> {
        if !(start.is_finite() && end.is_finite()) {
            return Err(QdriveError::ParameterValidation(format!(
                "sweep range [{}, {}] is not finite",
                start, end
            )));
        }
        if end <= start {
            return Err(QdriveError::ParameterValidation(format!(
                "sweep end {} must be above start {}",
                end, start
            )));
        }

        match *self {
            SamplingFunction::Linear { points } => {
                check_points(points)?;
                let step = (end - start) / (points - 1) as f64;
                Ok((0..points).map(|k| start + step * k as f64).collect())
            }
            SamplingFunction::Logarithmic { points } => {
                check_points(points)?;
                if start <= 0.0 {
                    return Err(QdriveError::ParameterValidation(format!(
                        "logarithmic sweep needs a positive start, got {}",
                        start
                    )));
                }
                let ratio = (end / start).ln() / (points - 1) as f64;
                Ok((0..points)
                    .map(|k| start * (ratio * k as f64).exp())
                    .collect())
            }
            SamplingFunction::FixedStep { step } => {
                if !(step.is_finite() && step > 0.0) {
                    return Err(QdriveError::ParameterValidation(format!(
                        "sweep step must be positive, got {}",
                        step
                    )));
                }
                let count = ((end - start) / step).ceil() as usize;
                Ok((0..count).map(|k| start + step * k as f64).collect())
            }
        }
    }

    /// Time grid snapped to whole nanoseconds, duplicates removed
    pub fn time_samples(&self, start: f64, end: f64) -> QdriveResult<Vec<f64>> {
        self.time_samples_on(start, end, TIME_RESOLUTION_S)
    }

    /// Time grid snapped to whole multiples of `spacing`, duplicates removed
    pub fn time_samples_on(&self, start: f64, end: f64, spacing: f64) -> QdriveResult<Vec<f64>> {
        if !(spacing.is_finite() && spacing >= TIME_RESOLUTION_S) {
            return Err(QdriveError::ParameterValidation(format!(
                "time spacing must be at least {} s, got {}",
                TIME_RESOLUTION_S, spacing
            )));
        }
        let mut grid: Vec<f64> = self
            .samples(start, end)?
            .into_iter()
            .map(|t| (t / spacing).round() * spacing)
            .collect();
        grid.dedup();
        if grid.len() < 2 {
            return Err(QdriveError::ParameterValidation(format!(
                "time grid [{}, {}] collapses below {} s resolution",
                start, end, spacing
            )));
        }
        Ok(grid)
    }
}

impl Default for SamplingFunction {
    fn default() -> Self {
        SamplingFunction::Linear { points: 100 }
    }
}

impl fmt::Display for SamplingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingFunction::Linear { points } => write!(f, "linspace({})", points),
            SamplingFunction::Logarithmic { points } => write!(f, "logspace({})", points),
            SamplingFunction::FixedStep { step } => write!(f, "arange(step={})", step),
        }
    }
}

fn check_points(points: usize) -> QdriveResult<()> {
    if points < 2 {
        return Err(QdriveError::ParameterValidation(format!(
            "a sweep needs at least 2 points, got {}",
            points
        )));
    }
    Ok(())
}

/// Round a time to the sequencer resolution
pub fn snap_time(t: f64) -> f64 {
    (t / TIME_RESOLUTION_S).round() * TIME_RESOLUTION_S
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear() {
        let grid = SamplingFunction::Linear { points: 5 }.samples(0.0, 1.0).unwrap();
        assert_eq!(grid.len(), 5);
        assert_relative_eq!(grid[1], 0.25);
        assert_relative_eq!(grid[4], 1.0);
    }

    #[test]
    fn test_logarithmic() {
        let grid = SamplingFunction::Logarithmic { points: 3 }
            .samples(1e-6, 100e-6)
            .unwrap();
        assert_relative_eq!(grid[1], 10e-6, max_relative = 1e-12);
        assert_relative_eq!(grid[2], 100e-6, max_relative = 1e-12);

        assert!(SamplingFunction::Logarithmic { points: 3 }
            .samples(0.0, 1.0)
            .is_err());
    }

    #[test]
    fn test_fixed_step_excludes_end() {
        let grid = SamplingFunction::FixedStep { step: 0.25 }.samples(0.0, 1.0).unwrap();
        assert_eq!(grid, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_invalid_ranges() {
        let lin = SamplingFunction::Linear { points: 10 };
        assert!(lin.samples(1.0, 1.0).is_err());
        assert!(lin.samples(0.0, f64::NAN).is_err());
        assert!(SamplingFunction::Linear { points: 1 }.samples(0.0, 1.0).is_err());
        assert!(SamplingFunction::FixedStep { step: 0.0 }.samples(0.0, 1.0).is_err());
    }

    #[test]
    fn test_time_snapping() {
        let grid = SamplingFunction::Linear { points: 4 }
            .time_samples(4e-9, 10.3e-9)
            .unwrap();
        assert_eq!(grid.len(), 4);
        for t in &grid {
            let ns = t / 1e-9;
            assert_relative_eq!(ns, ns.round(), epsilon = 1e-9);
        }
        assert!(SamplingFunction::Linear { points: 50 }
            .time_samples(4e-9, 4.4e-9)
            .is_err());
    }

    #[test]
    fn test_spaced_time_grid() {
        let grid = SamplingFunction::Linear { points: 30 }
            .time_samples_on(8e-9, 200e-9, 8e-9)
            .unwrap();
        assert!(grid.len() <= 25);
        for t in &grid {
            let periods = t / 8e-9;
            assert_relative_eq!(periods, periods.round(), epsilon = 1e-9);
        }
        assert!(SamplingFunction::Linear { points: 30 }
            .time_samples_on(8e-9, 200e-9, 0.5e-9)
            .is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            SamplingFunction::parse("linspace", 100.0).unwrap(),
            SamplingFunction::Linear { points: 100 }
        );
        assert_eq!(
            SamplingFunction::parse("arange", 2e-9).unwrap(),
            SamplingFunction::FixedStep { step: 2e-9 }
        );
        assert!(SamplingFunction::parse("logspace", 10.5).is_err());
        assert!(SamplingFunction::parse("geomspace", 10.0).is_err());
    }
}
