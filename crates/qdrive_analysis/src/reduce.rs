//! IQ-plane reduction
//!
//! Gantree: L4_Analysis → Reduce
//!
//! Collapses raw (I, Q) samples onto one real axis. The reference form
//! decides the method: a two-coordinate point reduces by Euclidean distance,
//! a single angle reduces by rotating onto the in-phase axis.

use num_complex::Complex64;
use qdrive_core::{IqPoint, IqReference, QdriveError, QdriveResult};

/// Reduce an (I, Q) trace to one real value per sample
/// Gantree: reduce_iq(i,q,reference) -> Vec<f64> // IQ 축소
pub fn reduce_iq(i: &[f64], q: &[f64], reference: &IqReference) -> QdriveResult<Vec<f64>> {
    if i.len() != q.len() {
        return Err(QdriveError::DatasetError(format!(
            "I has {} samples, Q has {}",
            i.len(),
            q.len()
        )));
    }

    let reduced = match reference {
        IqReference::TwoPoint(origin) => i
            .iter()
            .zip(q)
            .map(|(&i, &q)| IqPoint::new(i, q).distance(origin))
            .collect(),
        IqReference::Rotation(deg) => {
            let turn = Complex64::from_polar(1.0, -deg.to_radians());
            i.iter()
                .zip(q)
                .map(|(&i, &q)| (Complex64::new(i, q) * turn).re)
                .collect()
        }
    };
    Ok(reduced)
}

/// Rotate a point by `-deg` degrees
pub fn rotate(point: &IqPoint, deg: f64) -> IqPoint {
    let z = Complex64::new(point.i, point.q) * Complex64::from_polar(1.0, -deg.to_radians());
    IqPoint::new(z.re, z.im)
}

/// Angle (degrees, [0, 360)) that puts the ground→excited vector on +I
/// Gantree: rotation_onto_inphase(g,e) -> f64 // 회전각
pub fn rotation_onto_inphase(ground: &IqPoint, excited: &IqPoint) -> f64 {
    let d = Complex64::new(excited.i - ground.i, excited.q - ground.q);
    d.arg().to_degrees().rem_euclid(360.0)
}

/// Mean point of a set of shots
pub fn mean_point(points: &[IqPoint]) -> Option<IqPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (si, sq) = points
        .iter()
        .fold((0.0, 0.0), |(si, sq), p| (si + p.i, sq + p.q));
    Some(IqPoint::new(si / n, sq / n))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_two_point_distance() {
        let reference = IqReference::TwoPoint(IqPoint::new(1.0, 1.0));
        let out = reduce_iq(&[4.0, 1.0], &[5.0, 1.0], &reference).unwrap();
        assert_relative_eq!(out[0], 5.0);
        assert_relative_eq!(out[1], 0.0);
    }

    #[test]
    fn test_rotation_projects_onto_i() {
        // Point at 90 degrees rotated by 90 lands on +I
        let out = reduce_iq(&[0.0], &[2.0], &IqReference::Rotation(90.0)).unwrap();
        assert_relative_eq!(out[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        let reference = IqReference::Rotation(0.0);
        assert!(reduce_iq(&[1.0, 2.0], &[1.0], &reference).is_err());
    }

    #[test]
    fn test_rotation_onto_inphase() {
        let g = IqPoint::new(0.0, 0.0);
        let e = IqPoint::new(0.0, -1.0);
        let angle = rotation_onto_inphase(&g, &e);
        assert_relative_eq!(angle, 270.0, epsilon = 1e-9);

        let rotated = rotate(&e, angle);
        assert_relative_eq!(rotated.i, 1.0, epsilon = 1e-12);
        assert_relative_eq!(rotated.q, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mean_point() {
        assert!(mean_point(&[]).is_none());
        let m = mean_point(&[IqPoint::new(1.0, 2.0), IqPoint::new(3.0, 4.0)]).unwrap();
        assert_eq!(m, IqPoint::new(2.0, 3.0));
    }
}
