//! Point-based alignment of landmark labels.
//!
//! Labels of equal value in the moving and fixed volumes are paired and a
//! restricted affine is fitted to the pairs in physical space. The fitted
//! transform follows the pull-back convention: it maps fixed-space points
//! onto moving-space points, so resampling the moving image through it lands
//! the image on the fixed grid.

use std::path::Path;

use cordreg_core::geometry::{Matrix3d, Point3, Vector3};
use cordreg_core::image::ImageGeometry;
use cordreg_core::label::LabelSet;
use cordreg_core::transform::AffineTransform;
use cordreg_io::{read_labels, write_itk_affine};
use tracing::debug;

use crate::error::{ArtifactContext, RegistrationError, Result};
use crate::plan::DegreesOfFreedom;

const DEGENERATE_TOLERANCE: f64 = 1e-9;

/// Result of a landmark fit.
#[derive(Debug, Clone, PartialEq)]
pub enum LandmarkOutcome {
    Estimated(AffineTransform),
    Failed { reason: String },
}

impl LandmarkOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        LandmarkOutcome::Failed { reason: reason.into() }
    }

    /// The fitted transform, or a landmark estimation error.
    pub fn into_result(self) -> Result<AffineTransform> {
        match self {
            LandmarkOutcome::Estimated(transform) => Ok(transform),
            LandmarkOutcome::Failed { reason } => Err(RegistrationError::landmark_estimation(reason)),
        }
    }
}

/// Fit an affine restricted to `dof` that maps `fixed` landmarks onto
/// `moving` landmarks of the same value.
///
/// The fit is centred on the fixed centroid. Rotation comes from an SVD of
/// the cross-covariance, scale from a per-axis least-squares fit after
/// rotation, translation from the centroid difference.
pub fn estimate_landmark_affine(
    moving: &LabelSet,
    moving_geometry: &ImageGeometry,
    fixed: &LabelSet,
    fixed_geometry: &ImageGeometry,
    dof: &DegreesOfFreedom,
) -> LandmarkOutcome {
    let moving_points = moving.centroids(moving_geometry);
    let fixed_points = fixed.centroids(fixed_geometry);

    let pairs: Vec<(Point3, Point3)> = fixed_points
        .iter()
        .filter_map(|(value, q)| {
            moving_points
                .iter()
                .find(|(v, _)| (v - value).abs() < 1e-6)
                .map(|(_, p)| (*p, *q))
        })
        .collect();
    if pairs.len() < 2 {
        return LandmarkOutcome::failed(format!(
            "{} matching landmark pair(s); at least 2 are required",
            pairs.len()
        ));
    }

    let n = pairs.len() as f64;
    let p_mean = pairs.iter().fold(Vector3::zeros(), |acc, (p, _)| acc + p.coords) / n;
    let q_mean = pairs.iter().fold(Vector3::zeros(), |acc, (_, q)| acc + q.coords) / n;
    let centered: Vec<(Vector3, Vector3)> = pairs
        .iter()
        .map(|(p, q)| (p.coords - p_mean, q.coords - q_mean))
        .collect();

    let rotation = if dof.any_rotation() {
        if rank(centered.iter().map(|(_, q)| *q)) < 2 || rank(centered.iter().map(|(p, _)| *p)) < 2 {
            return LandmarkOutcome::failed("landmarks are collinear; rotation is undetermined");
        }
        match kabsch(&centered) {
            Some(r) => r,
            None => return LandmarkOutcome::failed("singular value decomposition did not converge"),
        }
    } else {
        Matrix3d::identity()
    };

    let mut scale = Vector3::new(1.0, 1.0, 1.0);
    for axis in (0..3).filter(|&a| dof.scale[a]) {
        let (num, den) = centered.iter().fold((0.0, 0.0), |(num, den), (p, q)| {
            let unrotated = rotation.transpose() * p;
            (num + unrotated[axis] * q[axis], den + q[axis] * q[axis])
        });
        if den < DEGENERATE_TOLERANCE {
            return LandmarkOutcome::failed(format!("landmarks have no extent along scaled axis {axis}"));
        }
        scale[axis] = num / den;
    }

    let mut translation = p_mean - q_mean;
    for axis in 0..3 {
        if !dof.translation[axis] {
            translation[axis] = 0.0;
        }
    }

    let matrix = rotation * Matrix3d::from_diagonal(&scale);
    let transform = AffineTransform::new(matrix, translation, Point3::from(q_mean));

    let rms = (pairs
        .iter()
        .map(|(p, q)| (transform.apply(q) - p).norm_squared())
        .sum::<f64>()
        / n)
        .sqrt();
    debug!("Landmark fit on {} pairs, residual {:.3} mm", pairs.len(), rms);

    LandmarkOutcome::Estimated(transform)
}

/// Rotation `R` minimising `Σ |R q - p|²` over centred pairs `(p, q)`.
fn kabsch(centered: &[(Vector3, Vector3)]) -> Option<Matrix3d> {
    let h = centered
        .iter()
        .fold(Matrix3d::zeros(), |acc, (p, q)| acc + q * p.transpose());
    let svd = h.svd(true, true);
    let u = svd.u?;
    let v = svd.v_t?.transpose();
    let d = (v * u.transpose()).determinant().signum();
    Some(v * Matrix3d::from_diagonal(&Vector3::new(1.0, 1.0, d)) * u.transpose())
}

/// Numerical rank of a centred point cloud.
fn rank(points: impl Iterator<Item = Vector3>) -> usize {
    let scatter = points.fold(Matrix3d::zeros(), |acc, v| acc + v * v.transpose());
    let values = scatter.symmetric_eigenvalues();
    let largest = values.iter().cloned().fold(0.0, f64::max);
    if largest < DEGENERATE_TOLERANCE {
        return 0;
    }
    values.iter().filter(|&&v| v > largest * 1e-8).count()
}

/// Fit the landmark transform between two label volumes and write it as an
/// ITK text transform.
///
/// A failed fit is returned as [`LandmarkOutcome::Failed`] and nothing is
/// written.
pub fn register_landmarks(
    moving_path: &Path,
    fixed_path: &Path,
    dof: &DegreesOfFreedom,
    output: &Path,
) -> Result<LandmarkOutcome> {
    let (moving, moving_geometry) = read_labels(moving_path).for_artifact(moving_path)?;
    let (fixed, fixed_geometry) = read_labels(fixed_path).for_artifact(fixed_path)?;
    let outcome = estimate_landmark_affine(&moving, &moving_geometry, &fixed, &fixed_geometry, dof);
    if let LandmarkOutcome::Estimated(transform) = &outcome {
        write_itk_affine(output, transform).for_artifact(output)?;
    }
    Ok(outcome)
}
