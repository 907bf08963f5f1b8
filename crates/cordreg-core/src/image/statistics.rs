//! Intensity statistics over voxel buffers.
//!
//! All functions take values flattened in `[Z, Y, X]` order together with the
//! grid they were sampled on.

use super::geometry::ImageGeometry;
use crate::geometry::{Point3, Vector3};

/// Intensity-weighted centre of mass in physical space.
///
/// Negative values are ignored. Returns `None` for an empty or all-zero
/// volume.
pub fn center_of_mass(values: &[f32], geometry: &ImageGeometry) -> Option<Point3> {
    let mut weighted = Vector3::zeros();
    let mut total = 0.0f64;
    for (offset, &v) in values.iter().enumerate() {
        if v <= 0.0 {
            continue;
        }
        let w = v as f64;
        let p = geometry.voxel_to_physical(geometry.voxel_index(offset));
        weighted += p.coords * w;
        total += w;
    }
    (total > 0.0).then(|| Point3::from(weighted / total))
}

/// Second-order moments of the intensity distribution in the physical
/// axial (x, y) plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InPlaneMoments {
    /// Physical centre of mass.
    pub center: Point3,
    /// Angle (radians, about +z) of the principal axis.
    pub angle: f64,
    /// Ratio of the largest to the smallest in-plane eigenvalue.
    pub eigen_ratio: f64,
}

/// Compute [`InPlaneMoments`] of a volume.
pub fn in_plane_moments(values: &[f32], geometry: &ImageGeometry) -> Option<InPlaneMoments> {
    let center = center_of_mass(values, geometry)?;
    let (mut cxx, mut cyy, mut cxy, mut total) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for (offset, &v) in values.iter().enumerate() {
        if v <= 0.0 {
            continue;
        }
        let w = v as f64;
        let d = geometry.voxel_to_physical(geometry.voxel_index(offset)) - center;
        cxx += w * d[0] * d[0];
        cyy += w * d[1] * d[1];
        cxy += w * d[0] * d[1];
        total += w;
    }
    cxx /= total;
    cyy /= total;
    cxy /= total;

    let mean = 0.5 * (cxx + cyy);
    let spread = (0.25 * (cxx - cyy).powi(2) + cxy * cxy).sqrt();
    let major = mean + spread;
    let minor = mean - spread;
    let eigen_ratio = if minor > 1e-12 { major / minor } else { f64::INFINITY };

    Some(InPlaneMoments {
        center,
        angle: 0.5 * (2.0 * cxy).atan2(cxx - cyy),
        eigen_ratio,
    })
}

/// Pearson correlation between two equally-sized buffers.
///
/// Returns `None` when the lengths differ or either buffer is constant.
pub fn normalized_cross_correlation(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// First and last index along `axis` holding a non-zero voxel.
pub fn nonzero_extent(values: &[f32], geometry: &ImageGeometry, axis: usize) -> Option<(usize, usize)> {
    let mut bounds: Option<(usize, usize)> = None;
    for (offset, &v) in values.iter().enumerate() {
        if v == 0.0 {
            continue;
        }
        let i = geometry.voxel_index(offset)[axis];
        bounds = Some(match bounds {
            None => (i, i),
            Some((lo, hi)) => (lo.min(i), hi.max(i)),
        });
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(geometry: &ImageGeometry, center: [f64; 3], radius: [f64; 3]) -> Vec<f32> {
        (0..geometry.voxel_count())
            .map(|offset| {
                let [x, y, z] = geometry.voxel_index(offset);
                let r = ((x as f64 - center[0]) / radius[0]).powi(2)
                    + ((y as f64 - center[1]) / radius[1]).powi(2)
                    + ((z as f64 - center[2]) / radius[2]).powi(2);
                if r <= 1.0 { 1.0 } else { 0.0 }
            })
            .collect()
    }

    #[test]
    fn test_center_of_mass_of_symmetric_blob() {
        let geometry = ImageGeometry::with_shape([20, 20, 20]);
        let values = blob(&geometry, [8.0, 11.0, 9.0], [3.0, 3.0, 3.0]);
        let com = center_of_mass(&values, &geometry).unwrap();
        assert!((com - Point3::new(8.0, 11.0, 9.0)).norm() < 1e-9);
    }

    #[test]
    fn test_center_of_mass_empty() {
        let geometry = ImageGeometry::with_shape([4, 4, 4]);
        assert!(center_of_mass(&vec![0.0; 64], &geometry).is_none());
    }

    #[test]
    fn test_in_plane_moments_elongated_along_x() {
        let geometry = ImageGeometry::with_shape([30, 30, 5]);
        let values = blob(&geometry, [15.0, 15.0, 2.0], [8.0, 3.0, 2.0]);
        let moments = in_plane_moments(&values, &geometry).unwrap();
        assert!(moments.angle.abs() < 1e-6, "angle {}", moments.angle);
        assert!(moments.eigen_ratio > 4.0, "ratio {}", moments.eigen_ratio);
    }

    #[test]
    fn test_ncc_properties() {
        let a: Vec<f32> = (0..50).map(|v| (v as f32 * 0.3).sin()).collect();
        let b: Vec<f32> = a.iter().map(|v| 2.0 * v + 1.0).collect();
        let c: Vec<f32> = a.iter().map(|v| -v).collect();
        assert!((normalized_cross_correlation(&a, &b).unwrap() - 1.0).abs() < 1e-9);
        assert!((normalized_cross_correlation(&a, &c).unwrap() + 1.0).abs() < 1e-9);
        assert!(normalized_cross_correlation(&a, &vec![1.0; 50]).is_none());
    }

    #[test]
    fn test_nonzero_extent() {
        let geometry = ImageGeometry::with_shape([4, 4, 10]);
        let mut values = vec![0.0f32; geometry.voxel_count()];
        values[geometry.linear_index([1, 2, 3])] = 1.0;
        values[geometry.linear_index([2, 2, 7])] = 0.5;
        assert_eq!(nonzero_extent(&values, &geometry, 2), Some((3, 7)));
        assert_eq!(nonzero_extent(&values, &geometry, 0), Some((1, 2)));
        assert_eq!(nonzero_extent(&vec![0.0; 160], &geometry, 2), None);
    }
}
