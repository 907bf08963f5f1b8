//! Moving point labels between grids of different resolution.
//!
//! Interpolating a label volume would blur or drop single-voxel labels, so
//! labels are moved by rescaling their indices instead.

use super::landmark::{LabelSet, Landmark};

/// Per-axis index scaling factor `n_src / n_dst`.
pub fn scaling_factors(src_shape: [usize; 3], dst_shape: [usize; 3]) -> [f64; 3] {
    [0, 1, 2].map(|axis| src_shape[axis] as f64 / dst_shape[axis].max(1) as f64)
}

/// Rescale every landmark index from `src_shape` to `dst_shape`.
///
/// The new index is `round(index / factor)` (halves away from zero),
/// clamped to the destination grid. Values are unchanged.
pub fn resample_landmarks(labels: &LabelSet, src_shape: [usize; 3], dst_shape: [usize; 3]) -> LabelSet {
    let factors = scaling_factors(src_shape, dst_shape);
    labels
        .iter()
        .map(|landmark| {
            let mut index = [0usize; 3];
            for axis in 0..3 {
                let scaled = (landmark.index[axis] as f64 / factors[axis]).round();
                let limit = dst_shape[axis].saturating_sub(1) as f64;
                index[axis] = scaled.clamp(0.0, limit) as usize;
            }
            Landmark::new(index, landmark.value)
        })
        .collect()
}
