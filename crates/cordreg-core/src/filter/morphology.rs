//! Voxel-wise thresholding and grey-level dilation.

use burn::tensor::backend::Backend;

use crate::image::Image;

/// Binarize: voxels strictly above `threshold` become 1, others 0.
pub fn binarize<B: Backend>(input: &Image<B>, threshold: f64) -> Image<B> {
    input.with_data(input.data().clone().greater_elem(threshold).float())
}

/// Grey-level dilation with a spherical structuring element.
///
/// Each output voxel takes the maximum of the input over a ball of
/// `radius` voxels. Applied to a label volume this grows every label into a
/// small sphere while keeping its value.
pub fn dilate<B: Backend>(input: &Image<B>, radius: usize) -> Image<B> {
    if radius == 0 {
        return input.clone();
    }
    let geometry = input.geometry();
    let [nx, ny, nz] = geometry.shape();
    let r = radius as i64;
    let offsets: Vec<[i64; 3]> = (-r..=r)
        .flat_map(|dz| (-r..=r).flat_map(move |dy| (-r..=r).map(move |dx| [dx, dy, dz])))
        .filter(|[dx, dy, dz]| dx * dx + dy * dy + dz * dz <= r * r)
        .collect();

    let source = input.to_vec();
    let mut output = source.clone();
    for (offset, &value) in source.iter().enumerate() {
        if value == 0.0 {
            continue;
        }
        let [x, y, z] = geometry.voxel_index(offset);
        for [dx, dy, dz] in &offsets {
            let target = [x as i64 + dx, y as i64 + dy, z as i64 + dz];
            if !geometry.contains(target) {
                continue;
            }
            let t = (target[2] as usize * ny + target[1] as usize) * nx + target[0] as usize;
            if value > output[t] {
                output[t] = value;
            }
        }
    }
    debug_assert_eq!(output.len(), nx * ny * nz);

    Image::from_vec(output, geometry.clone(), &input.data().device())
}
