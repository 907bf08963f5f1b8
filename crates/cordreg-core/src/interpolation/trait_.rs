//! Interpolator trait for sampling values at continuous coordinates.
//!
//! This module defines the core Interpolator trait that all interpolation methods must implement.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Interpolator trait for sampling values at continuous coordinates.
///
/// Interpolators are used to sample image values at non-integer coordinates,
/// which is essential for resampling. Samples outside the grid take the value
/// of the nearest border voxel.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// Interpolate values from a volume at given continuous indices.
    ///
    /// # Arguments
    /// * `data` - The source volume `[Z, Y, X]`
    /// * `indices` - The indices at which to interpolate `[Batch, 3]`, as `(x, y, z)`
    ///
    /// # Returns
    /// Tensor of sampled values `[Batch]`
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}
