//! Windowed median/IQR outlier rejection
//!
//! Gantree: L4_Analysis → OutlierFilter

use qdrive_core::analysis::{OUTLIER_THRESHOLD, OUTLIER_WINDOW};
use serde::{Deserialize, Serialize};

/// Windowed interquartile-range outlier filter
/// Gantree: OutlierFilter // 이상치 제거
///
/// A sample is rejected when it falls more than `threshold` IQRs outside the
/// quartiles of the window centred on it. Windows are clipped at the series
/// ends; a window with zero spread rejects nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierFilter {
    /// Window length in samples
    pub window: usize,
    /// IQR multiplier
    pub threshold: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self {
            window: OUTLIER_WINDOW,
            threshold: OUTLIER_THRESHOLD,
        }
    }
}

impl OutlierFilter {
    /// Create filter
    pub fn new(window: usize, threshold: f64) -> Self {
        Self { window, threshold }
    }

    /// Filter that keeps every sample
    pub fn disabled() -> Self {
        Self {
            window: 0,
            threshold: f64::INFINITY,
        }
    }

    /// Per-sample keep flags
    /// Gantree: keep_mask(y) -> Vec<bool> // 유지 여부
    pub fn keep_mask(&self, y: &[f64]) -> Vec<bool> {
        if self.window < 3 || !self.threshold.is_finite() || y.len() < 3 {
            return vec![true; y.len()];
        }
        let half = self.window / 2;
        (0..y.len())
            .map(|k| {
                let lo = k.saturating_sub(half);
                let hi = (k + half + 1).min(y.len());
                let mut win: Vec<f64> = y[lo..hi].iter().copied().filter(|v| v.is_finite()).collect();
                if !y[k].is_finite() {
                    return false;
                }
                win.sort_by(|a, b| a.total_cmp(b));
                let q1 = quantile(&win, 0.25);
                let q3 = quantile(&win, 0.75);
                let iqr = q3 - q1;
                if iqr <= 0.0 {
                    return true;
                }
                y[k] >= q1 - self.threshold * iqr && y[k] <= q3 + self.threshold * iqr
            })
            .collect()
    }

    /// Drop rejected samples from paired series
    pub fn apply(&self, x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mask = self.keep_mask(y);
        let rejected = mask.iter().filter(|k| !**k).count();
        if rejected > 0 {
            log::debug!("Outlier filter rejected {} of {} samples", rejected, y.len());
        }
        x.iter()
            .zip(y)
            .zip(mask)
            .filter(|(_, keep)| *keep)
            .map(|((x, y), _)| (*x, *y))
            .unzip()
    }
}

/// Median of a slice (unsorted input)
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(quantile(&sorted, 0.5))
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

// ============================================================================
// Tests
// ============================================================================
