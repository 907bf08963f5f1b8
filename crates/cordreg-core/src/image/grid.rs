use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Generate the voxel indices of a 3D grid.
///
/// Returns a tensor of shape `[N, 3]` where N is the total number of voxels.
/// Rows are `(x, y, z)` and follow the flattened `[Z, Y, X]` tensor order,
/// so row `i` belongs to the voxel at linear offset `i`.
///
/// # Arguments
/// * `shape` - Number of voxels along `(x, y, z)`
/// * `device` - The device to create the tensor on
pub fn generate_grid<B: Backend>(shape: [usize; 3], device: &B::Device) -> Tensor<B, 2> {
    let [w, h, d] = shape;
    let total = d * h * w;

    let mut grid = Vec::with_capacity(total * 3);
    for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                grid.push(x as f32);
                grid.push(y as f32);
                grid.push(z as f32);
            }
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * 3])), device)
        .reshape([total, 3])
}
