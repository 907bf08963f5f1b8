//! Cropping along a single axis.

use burn::tensor::backend::Backend;

use crate::image::Image;

/// Keep indices `start..=end` along `axis` (0 = x, 1 = y, 2 = z).
///
/// Bounds are clamped to the grid; the origin moves to the first kept voxel.
pub fn crop_axis<B: Backend>(input: &Image<B>, axis: usize, start: usize, end: usize) -> Image<B> {
    let shape = input.shape();
    let end = end.min(shape[axis] - 1);
    let start = start.min(end);

    let [nz, ny, nx] = input.geometry().tensor_shape();
    let mut ranges = [0..nz, 0..ny, 0..nx];
    // Tensor dimensions are reversed with respect to (x, y, z).
    ranges[2 - axis] = start..end + 1;

    let data = input.data().clone().slice(ranges);
    Image::new(data, input.geometry().cropped(axis, start, end))
}
