//! Synthetic third landmark for rigid alignment.
//!
//! Two landmarks along the cord leave rotation about the cord axis
//! undetermined. A third point is added at a fixed physical offset along the
//! first index axis from the lowest-valued label, in both the subject and
//! the template label sets. Volumes are reoriented to RPI beforehand, so the
//! offset points the same anatomical way in both.

use super::error::LabelError;
use super::landmark::{LabelSet, Landmark};
use crate::image::ImageGeometry;

/// Default physical offset of the synthetic label, in mm.
pub const SYNTHETIC_OFFSET_MM: f64 = 5.0;

/// Default value of the synthetic label.
pub const SYNTHETIC_LABEL_VALUE: f64 = 99.0;

/// Pick a synthetic label value absent from every given set.
///
/// `preferred` is used when free, otherwise one above the largest value.
pub fn choose_sentinel(sets: &[&LabelSet], preferred: f64) -> f64 {
    if sets.iter().all(|s| !s.contains_value(preferred)) {
        return preferred;
    }
    let max = sets
        .iter()
        .filter_map(|s| s.max_value())
        .fold(preferred, f64::max);
    max.floor() + 1.0
}

/// Return `labels` plus one synthetic landmark.
///
/// The new landmark sits `round(offset_mm / spacing_x)` voxels, and at
/// least one voxel, from the lowest-valued label along the first axis,
/// keeping its y and z. A label covering several voxels is placed from
/// their mean index. If that position leaves the grid the offset is applied
/// in the opposite direction; if both leave the grid an error is returned.
pub fn synthesize_offset_label(
    labels: &LabelSet,
    geometry: &ImageGeometry,
    offset_mm: f64,
    value: f64,
) -> Result<LabelSet, LabelError> {
    let lowest = labels
        .sorted_by_value()
        .first()
        .map(|l| l.value)
        .ok_or(LabelError::Count { expected: 1, found: 0 })?;
    let [x, y, z] = mean_index(labels, lowest);

    let shift = match (offset_mm / geometry.spacing()[0]).round() as i64 {
        0 if offset_mm < 0.0 => -1,
        0 => 1,
        s => s,
    };

    let candidate = [x + shift, y, z];
    let index = if geometry.contains(candidate) {
        candidate
    } else {
        let fallback = [x - shift, y, z];
        if !geometry.contains(fallback) {
            return Err(LabelError::Placement {
                index: candidate,
                shape: geometry.shape(),
            });
        }
        fallback
    };

    let landmark = Landmark::new(index.map(|i| i as usize), value);
    Ok(labels.with_landmark(landmark))
}

/// Rounded mean voxel index of the landmarks carrying `value`.
fn mean_index(labels: &LabelSet, value: f64) -> [i64; 3] {
    let voxels: Vec<&Landmark> = labels.iter().filter(|l| l.value == value).collect();
    let count = voxels.len().max(1) as f64;
    [0, 1, 2].map(|axis| {
        let sum: f64 = voxels.iter().map(|l| l.index[axis] as f64).sum();
        (sum / count).round() as i64
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Direction3, Point3, Spacing3};

    fn geometry(nx: usize, px: f64) -> ImageGeometry {
        ImageGeometry::new([nx, 20, 30], Point3::origin(), Spacing3::new(px, 1.0, 1.0), Direction3::identity())
    }

    fn pair() -> LabelSet {
        LabelSet::new(vec![Landmark::new([6, 9, 20], 4.0), Landmark::new([7, 9, 10], 2.0)])
    }

    #[test]
    fn test_offset_from_lowest_label_along_x_only() {
        let out = synthesize_offset_label(&pair(), &geometry(20, 0.5), 5.0, 99.0).unwrap();
        assert_eq!(out.len(), 3);
        let synthetic = out.iter().find(|l| l.value == 99.0).unwrap();
        assert_eq!(synthetic.index, [17, 9, 10]);
    }

    #[test]
    fn test_falls_back_to_opposite_side() {
        let out = synthesize_offset_label(&pair(), &geometry(12, 1.0), 5.0, 99.0).unwrap();
        let synthetic = out.iter().find(|l| l.value == 99.0).unwrap();
        assert_eq!(synthetic.index, [2, 9, 10]);
    }

    #[test]
    fn test_placement_error_when_grid_too_narrow() {
        let err = synthesize_offset_label(&pair(), &geometry(8, 0.5), 5.0, 99.0).unwrap_err();
        assert!(matches!(err, LabelError::Placement { .. }));
    }

    #[test]
    fn test_multi_voxel_label_placed_from_its_mean() {
        let labels = LabelSet::new(vec![
            Landmark::new([6, 8, 9], 2.0),
            Landmark::new([8, 10, 11], 2.0),
            Landmark::new([6, 9, 20], 4.0),
        ]);
        let out = synthesize_offset_label(&labels, &geometry(20, 1.0), 5.0, 99.0).unwrap();
        let synthetic = out.iter().find(|l| l.value == 99.0).unwrap();
        assert_eq!(synthetic.index, [12, 9, 10]);
    }

    #[test]
    fn test_sub_voxel_offset_still_moves_one_voxel() {
        let out = synthesize_offset_label(&pair(), &geometry(20, 4.0), 1.0, 99.0).unwrap();
        let synthetic = out.iter().find(|l| l.value == 99.0).unwrap();
        assert_eq!(synthetic.index, [8, 9, 10]);
        assert!(out.iter().filter(|l| l.value == 2.0).all(|l| l.index != synthetic.index));
    }

    #[test]
    fn test_sentinel_avoids_existing_values() {
        let a = pair();
        let b = LabelSet::new(vec![Landmark::new([0, 0, 0], 99.0)]);
        assert_eq!(choose_sentinel(&[&a], 99.0), 99.0);
        assert_eq!(choose_sentinel(&[&a, &b], 99.0), 100.0);
    }
}
