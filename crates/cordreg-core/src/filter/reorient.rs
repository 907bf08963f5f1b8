//! Reorientation filter.
//!
//! Permutes and flips voxel axes so that a volume matches a target
//! orientation code. Every voxel keeps its physical position, so the
//! operation is exact and safe for label volumes.

use burn::tensor::backend::Backend;

use crate::image::Image;
use crate::spatial::Orientation;

/// Reorient an image to `target`.
pub fn reorient<B: Backend>(input: &Image<B>, target: Orientation) -> Image<B> {
    let plan = Orientation::of(input.geometry()).plan_to(target);
    if plan.is_identity() {
        return input.clone();
    }

    let geometry = plan.apply_to_geometry(input.geometry());
    let source = input.to_vec();
    let output_shape = geometry.shape();
    let values: Vec<f32> = (0..geometry.voxel_count())
        .map(|offset| {
            let index = geometry.voxel_index(offset);
            source[input.geometry().linear_index(plan.source_index(index, output_shape))]
        })
        .collect();

    Image::from_vec(values, geometry, &input.data().device())
}
