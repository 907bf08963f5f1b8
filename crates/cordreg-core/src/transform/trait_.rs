//! Transform trait for spatial coordinate transformations.
//!
//! This module defines the core Transform trait that all spatial transforms must implement.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::geometry::Point3;

/// Transform trait for spatial coordinate transformations.
///
/// Maps points from one physical space to another. Transforms used for
/// resampling follow the pull-back convention: they map points of the
/// *output* (destination) grid to the *input* (source) grid.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Transform<B: Backend> {
    /// Apply transform to a batch of points.
    ///
    /// # Arguments
    /// * `points` - Tensor of shape `[Batch, 3]` containing the input points
    ///
    /// # Returns
    /// Tensor of shape `[Batch, 3]` containing the transformed points
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Get the inverse transform (if available).
    ///
    /// Not all transforms are easily invertible, so this returns an Option.
    fn inverse(&self) -> Option<Box<dyn Transform<B>>> {
        None
    }
}

/// Apply a transform to a single point.
pub fn transform_point<B: Backend, T: Transform<B> + ?Sized>(
    transform: &T,
    point: &Point3,
    device: &B::Device,
) -> Point3 {
    let input = Tensor::<B, 2>::from_floats(
        [[point[0] as f32, point[1] as f32, point[2] as f32]],
        device,
    );
    let out = transform
        .transform_points(input)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_else(|_| vec![f32::NAN; 3]);
    Point3::new(out[0] as f64, out[1] as f64, out[2] as f64)
}
